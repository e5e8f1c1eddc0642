use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{DataUnitError, LocateError, PoolError};
use crate::types::{DataUnitRef, DataUnitType, ExecutionId};

/// An opened data unit. Implementations use interior mutability: the same
/// handle is shared by every caller holding the lease.
pub trait DataUnit: Send + Sync {
    /// Human readable name given by the producing DPU
    fn name(&self) -> &str;

    /// Identity inside the execution repository
    fn uri(&self) -> &str;

    /// Directory holding the data unit's on-disk state
    fn directory(&self) -> &Path;

    /// Load persisted content so the data unit can be browsed
    fn load(&self) -> Result<(), DataUnitError>;

    /// Release whatever the data unit holds open
    fn release(&self) -> Result<(), DataUnitError>;
}

/// Everything a factory needs to construct a data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUnitDescriptor {
    pub data_unit_type: DataUnitType,
    pub execution_id: ExecutionId,
    pub uri: String,
    pub name: String,
    pub directory: PathBuf,
}

/// Constructs data units for a given identity and directory.
pub trait DataUnitFactory: Send + Sync {
    fn create(&self, descriptor: &DataUnitDescriptor) -> Result<Arc<dyn DataUnit>, DataUnitError>;
}

/// Maps an execution/DPU/index triple to the directory a data unit lives in.
/// Must be deterministic: the directory string is the cache identity.
pub trait ResourceLocator: Send + Sync {
    fn data_unit_dir(&self, data_unit: &DataUnitRef) -> Result<PathBuf, LocateError>;
}

/// Process-wide pool of per-execution repositories shared by data units.
pub trait RepositoryPool: Send + Sync {
    /// Release the repository of `execution_id`; no data unit references it anymore.
    fn release(&self, execution_id: ExecutionId) -> Result<(), PoolError>;

    /// Check the backing storage is usable (select/insert/delete round trip).
    fn probe(&self) -> Result<(), PoolError> {
        Ok(())
    }
}
