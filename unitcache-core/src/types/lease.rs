use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ExecutionId;
use crate::infrastructure::DataUnit;

/// A time-bound hold on an opened data unit
#[derive(Clone)]
pub struct Lease {
    /// Unique lease ID, a reopened key gets a fresh one
    pub id: String,
    /// Identity of the leased resource (its directory path)
    pub resource_key: String,
    /// Execution the data unit belongs to
    pub execution_id: ExecutionId,
    /// The opened data unit, owned by the lease until it is closed
    pub resource: Arc<dyn DataUnit>,
    /// When the data unit was opened
    pub acquired_at: u64,
    /// Close no earlier than this instant (epoch millis)
    pub expires_at: u64,
    /// Last time a caller asked for the data unit
    pub last_access: u64,
}

impl Lease {
    pub fn new(
        resource_key: String,
        execution_id: ExecutionId,
        resource: Arc<dyn DataUnit>,
        lifetime_ms: u64,
        now: u64,
    ) -> Self {
        Self {
            id: format!("lease_{}", nanoid::nanoid!(12)),
            resource_key,
            execution_id,
            resource,
            acquired_at: now,
            expires_at: now.saturating_add(lifetime_ms),
            last_access: now,
        }
    }

    /// Pushes the expiry to `now + lifetime_ms` unless it is already later.
    /// Returns true when the expiry moved.
    pub fn extend(&mut self, lifetime_ms: u64, now: u64) -> bool {
        self.last_access = now;
        let candidate = now.saturating_add(lifetime_ms);
        if candidate > self.expires_at {
            self.expires_at = candidate;
            true
        } else {
            false
        }
    }

    /// A lease is closable from its expiry instant onwards.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn info(&self) -> LeaseInfo {
        LeaseInfo {
            id: self.id.clone(),
            resource_key: self.resource_key.clone(),
            execution_id: self.execution_id,
            data_unit: self.resource.name().to_string(),
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
            last_access: self.last_access,
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("resource_key", &self.resource_key)
            .field("execution_id", &self.execution_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a lease, safe to hand out to monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub id: String,
    pub resource_key: String,
    pub execution_id: ExecutionId,
    pub data_unit: String,
    pub acquired_at: u64,
    pub expires_at: u64,
    pub last_access: u64,
}

/// Outcome of one periodic sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Leases removed because they expired
    pub evicted: usize,
    /// Data units whose release failed (their table slots are gone anyway)
    pub failed_releases: usize,
    /// Executions whose shared repository was released
    pub executions_released: Vec<ExecutionId>,
}

/// Outcome of closing everything on process exit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub leases_closed: usize,
    pub failed_releases: usize,
    pub executions_released: Vec<ExecutionId>,
}
