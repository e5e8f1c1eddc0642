//! # unitcache-core
//!
//! Time-bounded lease cache for data units of pipeline executions.
//! Opens each data unit at most once, shares the handle between callers,
//! closes it after its lease expires and releases the execution's shared
//! repository once nothing references it anymore.

pub mod cache;
pub mod clock;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod locator;
pub mod manager;
pub mod sweeper;
pub mod types;

#[cfg(test)]
mod manager_test;
#[cfg(test)]
mod sweeper_test;
#[cfg(test)]
#[path = "infrastructure_test.rs"]
mod infrastructure_test;
