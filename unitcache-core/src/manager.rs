//! High-level entry point: resolves where a data unit lives, opens it through
//! the factory and keeps it leased in the [`LeaseCache`].
//! The HTTP host delegates to this.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cache::LeaseCache;
use crate::error::{DataUnitError, LeaseError};
use crate::infrastructure::{DataUnit, DataUnitDescriptor, DataUnitFactory, ResourceLocator};
use crate::types::{DataUnitRef, DpuInstanceId, ExecutionInfo};

/// Short lifetime, for browsing a data unit.
pub const CLOSE_TIME_SHORT: Duration = Duration::from_secs(10 * 60);

/// Longer lifetime, for downloads and exports taking up to an hour.
pub const CLOSE_TIME_LONG: Duration = Duration::from_secs(60 * 60);

pub struct DataUnitManager {
    cache: Arc<LeaseCache>,
    locator: Arc<dyn ResourceLocator>,
    factory: Arc<dyn DataUnitFactory>,
}

impl DataUnitManager {
    pub fn new(
        cache: Arc<LeaseCache>,
        locator: Arc<dyn ResourceLocator>,
        factory: Arc<dyn DataUnitFactory>,
    ) -> Self {
        Self {
            cache,
            locator,
            factory,
        }
    }

    pub fn cache(&self) -> &Arc<LeaseCache> {
        &self.cache
    }

    /// Data unit `index` produced by `dpu_instance_id` in `execution`, kept open
    /// for at least `time_to_close`.
    ///
    /// Returns `Ok(None)` when the execution has no record of that DPU or data
    /// unit; there is nothing to browse then.
    pub fn data_unit(
        &self,
        execution: &ExecutionInfo,
        dpu_instance_id: DpuInstanceId,
        index: u32,
        time_to_close: Duration,
    ) -> Result<Option<Arc<dyn DataUnit>>, LeaseError> {
        let Some(dpu) = execution.dpu(dpu_instance_id) else {
            error!(
                execution_id = execution.execution_id,
                dpu_instance_id, "DPU info is missing"
            );
            return Ok(None);
        };
        let Some(info) = dpu.data_unit(index) else {
            debug!(
                execution_id = execution.execution_id,
                dpu_instance_id, index, "No such data unit"
            );
            return Ok(None);
        };

        let data_unit = DataUnitRef::new(execution.execution_id, dpu_instance_id, index);
        let directory = self.locator.data_unit_dir(&data_unit).map_err(|e| {
            error!(data_unit = %data_unit.data_unit_id(), error = %e, "Missing resource");
            LeaseError::from(e)
        })?;
        let key = key_of(&directory);

        let descriptor = DataUnitDescriptor {
            data_unit_type: info.data_unit_type,
            execution_id: execution.execution_id,
            uri: data_unit.uri(),
            name: info.name.clone(),
            directory,
        };

        let unit = self.cache.acquire(
            &key,
            execution.execution_id,
            |_| self.open(&descriptor),
            time_to_close,
        )?;
        Ok(Some(unit))
    }

    /// Cache key the data unit is leased under.
    pub fn resource_key(&self, data_unit: &DataUnitRef) -> Result<String, LeaseError> {
        let directory = self.locator.data_unit_dir(data_unit)?;
        Ok(key_of(&directory))
    }

    /// [`DataUnitManager::data_unit`] with [`CLOSE_TIME_SHORT`].
    pub fn data_unit_for_browse(
        &self,
        execution: &ExecutionInfo,
        dpu_instance_id: DpuInstanceId,
        index: u32,
    ) -> Result<Option<Arc<dyn DataUnit>>, LeaseError> {
        self.data_unit(execution, dpu_instance_id, index, CLOSE_TIME_SHORT)
    }

    /// [`DataUnitManager::data_unit`] with [`CLOSE_TIME_LONG`].
    pub fn data_unit_for_download(
        &self,
        execution: &ExecutionInfo,
        dpu_instance_id: DpuInstanceId,
        index: u32,
    ) -> Result<Option<Arc<dyn DataUnit>>, LeaseError> {
        self.data_unit(execution, dpu_instance_id, index, CLOSE_TIME_LONG)
    }

    fn open(&self, descriptor: &DataUnitDescriptor) -> Result<Arc<dyn DataUnit>, DataUnitError> {
        let unit = self.factory.create(descriptor)?;

        if let Err(e) = unit.load() {
            if let Err(release_err) = unit.release() {
                warn!(name = %descriptor.name, error = %release_err, "Can't close data unit");
            }
            return Err(e);
        }

        info!(
            directory = %descriptor.directory.display(),
            data_unit_type = %descriptor.data_unit_type,
            "Data unit has been created for directory"
        );
        Ok(unit)
    }
}

fn key_of(directory: &Path) -> String {
    directory.to_string_lossy().into_owned()
}
