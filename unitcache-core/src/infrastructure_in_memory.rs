use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{DataUnitError, PoolError};
use crate::infrastructure::{DataUnit, DataUnitDescriptor, DataUnitFactory, RepositoryPool};
use crate::types::ExecutionId;

/// A data unit that keeps nothing on disk.
#[derive(Debug)]
pub struct InMemoryDataUnit {
    name: String,
    uri: String,
    directory: PathBuf,
    loaded: AtomicBool,
    released: AtomicBool,
    fail_load: bool,
}

impl InMemoryDataUnit {
    pub fn new(descriptor: &DataUnitDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            uri: descriptor.uri.clone(),
            directory: descriptor.directory.clone(),
            loaded: AtomicBool::new(false),
            released: AtomicBool::new(false),
            fail_load: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl DataUnit for InMemoryDataUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn directory(&self) -> &Path {
        &self.directory
    }

    fn load(&self) -> Result<(), DataUnitError> {
        if self.fail_load {
            return Err(DataUnitError::Load {
                name: self.name.clone(),
                reason: "content is not readable".to_string(),
            });
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), DataUnitError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(DataUnitError::Release {
                name: self.name.clone(),
                reason: "already released".to_string(),
            });
        }
        Ok(())
    }
}

/// Creates [`InMemoryDataUnit`]s and remembers every one it handed out.
#[derive(Debug, Default)]
pub struct InMemoryDataUnitFactory {
    created: Mutex<Vec<Arc<InMemoryDataUnit>>>,
    fail_load: bool,
}

impl InMemoryDataUnitFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose data units fail on `load`.
    pub fn failing_load() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            fail_load: true,
        }
    }

    pub fn created_count(&self) -> usize {
        self.created().len()
    }

    pub fn created(&self) -> Vec<Arc<InMemoryDataUnit>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DataUnitFactory for InMemoryDataUnitFactory {
    fn create(&self, descriptor: &DataUnitDescriptor) -> Result<Arc<dyn DataUnit>, DataUnitError> {
        let mut unit = InMemoryDataUnit::new(descriptor);
        unit.fail_load = self.fail_load;
        let unit = Arc::new(unit);
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&unit));
        Ok(unit)
    }
}

/// Repository pool that only records which executions were released.
#[derive(Debug, Default)]
pub struct InMemoryRepositoryPool {
    released: Mutex<Vec<ExecutionId>>,
    failing: Mutex<HashSet<ExecutionId>>,
    probe_failures: AtomicUsize,
}

impl InMemoryRepositoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every release of `execution_id` fail (it is still recorded).
    pub fn fail_release_for(&self, execution_id: ExecutionId) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(execution_id);
    }

    /// Make the next `n` probes fail.
    pub fn fail_probes(&self, n: usize) {
        self.probe_failures.store(n, Ordering::SeqCst);
    }

    /// Executions released so far, in order.
    pub fn released(&self) -> Vec<ExecutionId> {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn release_count(&self, execution_id: ExecutionId) -> usize {
        self.released()
            .iter()
            .filter(|id| **id == execution_id)
            .count()
    }
}

impl RepositoryPool for InMemoryRepositoryPool {
    fn release(&self, execution_id: ExecutionId) -> Result<(), PoolError> {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(execution_id);

        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&execution_id)
        {
            return Err(PoolError::Release {
                execution_id,
                reason: "repository is busy".to_string(),
            });
        }
        Ok(())
    }

    fn probe(&self) -> Result<(), PoolError> {
        let remaining = self.probe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.probe_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PoolError::Unavailable("probe failure injected".to_string()));
        }
        Ok(())
    }
}
