use std::path::PathBuf;

use crate::error::LocateError;
use crate::infrastructure::ResourceLocator;
use crate::types::DataUnitRef;

/// Lays data units out under a working directory:
/// `<working_dir>/exec_<execution>/dpu_<dpu>/du_<index>`.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    working_dir: PathBuf,
}

impl DirectoryLocator {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &std::path::Path {
        &self.working_dir
    }

    /// Directory shared by everything an execution produced.
    pub fn execution_dir(&self, execution_id: u64) -> Result<PathBuf, LocateError> {
        if self.working_dir.as_os_str().is_empty() {
            return Err(LocateError::MissingWorkingDir);
        }
        Ok(self.working_dir.join(format!("exec_{}", execution_id)))
    }
}

impl ResourceLocator for DirectoryLocator {
    fn data_unit_dir(&self, data_unit: &DataUnitRef) -> Result<PathBuf, LocateError> {
        Ok(self
            .execution_dir(data_unit.execution_id)?
            .join(format!("dpu_{}", data_unit.dpu_instance_id))
            .join(format!("du_{}", data_unit.index)))
    }
}
