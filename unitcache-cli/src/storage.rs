use std::path::Path;
use std::sync::Arc;

use unitcache_core::infrastructure::{DataUnitFactory, RepositoryPool};
use unitcache_core::infrastructure_in_memory::{InMemoryDataUnitFactory, InMemoryRepositoryPool};

/// Collaborators the cache runs against.
pub struct Backend {
    pub pool: Arc<dyn RepositoryPool>,
    pub factory: Arc<dyn DataUnitFactory>,
}

impl Backend {
    pub fn in_memory() -> Self {
        Self {
            pool: Arc::new(InMemoryRepositoryPool::new()),
            factory: Arc::new(InMemoryDataUnitFactory::new()),
        }
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite(working_dir: &Path) -> Self {
        use unitcache_core::infrastructure_sqlite::{SqliteDataUnitFactory, SqliteRepositoryPool};

        let pool = Arc::new(SqliteRepositoryPool::new(working_dir));
        Self {
            factory: Arc::new(SqliteDataUnitFactory::new(pool.clone())),
            pool,
        }
    }
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

pub fn create_backend(storage: &str, working_dir: &Path) -> Backend {
    match storage {
        "memory" => {
            tracing::info!("💾 Storage backend: in-memory (data units are not persisted)");
            Backend::in_memory()
        }
        "sqlite" => {
            #[cfg(feature = "sqlite")]
            {
                tracing::info!("💾 Storage backend: SQLite under {}", working_dir.display());
                Backend::sqlite(working_dir)
            }
            #[cfg(not(feature = "sqlite"))]
            {
                tracing::error!(
                    "SQLite storage requested but `sqlite` feature is not enabled. \
                     Rebuild with: cargo build --features sqlite"
                );
                tracing::warn!("Falling back to in-memory storage.");
                let _ = working_dir;
                Backend::in_memory()
            }
        }
        other => {
            tracing::error!(
                "Unknown storage backend: '{}'. Use 'memory' or 'sqlite'",
                other
            );
            tracing::warn!("Falling back to in-memory storage.");
            Backend::in_memory()
        }
    }
}
