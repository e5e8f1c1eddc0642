//! The data unit lease cache.
//!
//! At most one opened data unit exists per resource key. Callers asking for an
//! already opened key get the cached handle and push its expiry forward. A
//! periodic [`LeaseCache::sweep`] closes expired data units, and once no lease
//! references an execution anymore its shared repository is released.
//!
//! Everything is serialized on one mutex, including cold opens: while a data
//! unit is being opened no other key can be acquired, renewed or swept.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::{duration_ms, Clock, SystemClock};
use crate::error::{DataUnitError, LeaseError};
use crate::infrastructure::{DataUnit, RepositoryPool};
use crate::types::{ExecutionId, Lease, LeaseInfo, ShutdownReport, SweepReport};

/// Lease table plus the per-execution usage counter.
///
/// For every execution id the counter equals the number of leases carrying
/// that id. Methods here never touch data units or the pool; [`LeaseCache`]
/// does that around them.
#[derive(Debug, Default)]
pub struct LeaseTable {
    leases: HashMap<String, Lease>,
    usage: HashMap<ExecutionId, usize>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `key`, with its expiry pushed to `now + lifetime_ms`
    /// when that is later than the current one.
    pub fn renew(
        &mut self,
        key: &str,
        lifetime_ms: u64,
        now: u64,
    ) -> Option<Arc<dyn DataUnit>> {
        let lease = self.leases.get_mut(key)?;
        if lease.extend(lifetime_ms, now) {
            debug!(resource_key = %key, expires_at = lease.expires_at, "Lease extended");
        }
        Some(Arc::clone(&lease.resource))
    }

    pub fn insert(&mut self, lease: Lease) {
        *self.usage.entry(lease.execution_id).or_insert(0) += 1;
        if let Some(replaced) = self.leases.insert(lease.resource_key.clone(), lease) {
            // Callers check `renew` first under the same lock, so this never happens.
            warn!(resource_key = %replaced.resource_key, "Replaced a live lease");
            self.decrement(replaced.execution_id);
        }
    }

    /// Removes `key` and decrements its execution's counter.
    pub fn remove(&mut self, key: &str) -> Option<Lease> {
        let lease = self.leases.remove(key)?;
        self.decrement(lease.execution_id);
        Some(lease)
    }

    /// Removes every lease with `expires_at <= now`.
    pub fn take_expired(&mut self, now: u64) -> Vec<Lease> {
        let expired: Vec<String> = self
            .leases
            .values()
            .filter(|l| l.is_expired(now))
            .map(|l| l.resource_key.clone())
            .collect();

        expired
            .iter()
            .filter_map(|key| {
                info!(resource_key = %key, "Data unit expired, closing");
                self.remove(key)
            })
            .collect()
    }

    /// Pops one execution whose counter reached zero.
    pub fn next_idle_execution(&mut self) -> Option<ExecutionId> {
        let idle = self
            .usage
            .iter()
            .find(|(_, count)| **count == 0)
            .map(|(id, _)| *id)?;
        self.usage.remove(&idle);
        Some(idle)
    }

    /// Empties both tables, returning leases and every tracked execution.
    pub fn drain(&mut self) -> (Vec<Lease>, Vec<ExecutionId>) {
        let leases = self.leases.drain().map(|(_, l)| l).collect();
        let executions = self.usage.drain().map(|(id, _)| id).collect();
        (leases, executions)
    }

    pub fn usage(&self, execution_id: ExecutionId) -> usize {
        self.usage.get(&execution_id).copied().unwrap_or(0)
    }

    pub fn get(&self, key: &str) -> Option<&Lease> {
        self.leases.get(key)
    }

    /// Resource key of the lease with id `lease_id`.
    pub fn key_of(&self, lease_id: &str) -> Option<String> {
        self.leases
            .values()
            .find(|l| l.id == lease_id)
            .map(|l| l.resource_key.clone())
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub fn infos(&self) -> Vec<LeaseInfo> {
        self.leases.values().map(Lease::info).collect()
    }

    fn decrement(&mut self, execution_id: ExecutionId) {
        match self.usage.get_mut(&execution_id) {
            Some(count) => *count = count.saturating_sub(1),
            None => {
                warn!(execution_id, "Missing usage counter");
                self.usage.insert(execution_id, 0);
            }
        }
    }
}

/// Thread-safe lease cache over a [`LeaseTable`].
pub struct LeaseCache {
    state: Mutex<LeaseTable>,
    pool: Arc<dyn RepositoryPool>,
    clock: Arc<dyn Clock>,
}

impl LeaseCache {
    /// Create a cache on the wall clock.
    pub fn new(pool: Arc<dyn RepositoryPool>) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: Arc<dyn RepositoryPool>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(LeaseTable::new()),
            pool,
            clock,
        }
    }

    /// Return the data unit for `key`, opening it with `open` if it is not cached.
    ///
    /// A cached lease gets its expiry extended to `now + lifetime` unless it is
    /// already later. A cold open runs under the cache lock, so concurrent
    /// callers for the same key wait and then share the single opened handle.
    /// If `open` fails nothing is recorded, and the execution's repository is
    /// released when no other lease references it.
    pub fn acquire<F>(
        &self,
        key: &str,
        execution_id: ExecutionId,
        open: F,
        lifetime: Duration,
    ) -> Result<Arc<dyn DataUnit>, LeaseError>
    where
        F: FnOnce(&str) -> Result<Arc<dyn DataUnit>, DataUnitError>,
    {
        let lifetime_ms = duration_ms(lifetime);
        let mut table = self.lock();

        if let Some(resource) = table.renew(key, lifetime_ms, self.clock.now_ms()) {
            return Ok(resource);
        }

        let resource = match open(key) {
            Ok(resource) => resource,
            Err(source) => {
                warn!(resource_key = %key, error = %source, "Can't open data unit");
                // The open may have attached the execution's repository before failing.
                if table.usage(execution_id) == 0 {
                    self.release_repository(execution_id);
                }
                return Err(LeaseError::ResourceOpen {
                    key: key.to_string(),
                    source,
                });
            }
        };

        let lease = Lease::new(
            key.to_string(),
            execution_id,
            Arc::clone(&resource),
            lifetime_ms,
            self.clock.now_ms(),
        );
        info!(
            resource_key = %key,
            execution_id,
            lease_id = %lease.id,
            expires_at = lease.expires_at,
            "Lease created"
        );
        table.insert(lease);

        Ok(resource)
    }

    /// Close every expired data unit, then release repositories of executions
    /// no lease references anymore. Failures are logged and skipped.
    pub fn sweep(&self) -> SweepReport {
        let mut table = self.lock();
        let now = self.clock.now_ms();

        let expired = table.take_expired(now);
        let mut report = SweepReport {
            evicted: expired.len(),
            ..SweepReport::default()
        };
        for lease in expired {
            if !close_lease(&lease) {
                report.failed_releases += 1;
            }
        }

        report.executions_released = self.release_idle(&mut table);
        report
    }

    /// Close one lease ahead of its expiry. Returns false if `key` is not cached.
    pub fn release(&self, key: &str) -> bool {
        let mut table = self.lock();
        self.release_locked(&mut table, key)
    }

    /// Close the lease with id `lease_id`. Returns false if no live lease has
    /// that id, including when its key has since been leased again.
    pub fn release_lease(&self, lease_id: &str) -> bool {
        let mut table = self.lock();
        let Some(key) = table.key_of(lease_id) else {
            return false;
        };
        self.release_locked(&mut table, &key)
    }

    /// Close everything regardless of expiry. Must run on process exit.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut table = self.lock();
        let (leases, executions) = table.drain();
        if leases.is_empty() && executions.is_empty() {
            return ShutdownReport::default();
        }

        info!(
            leases = leases.len(),
            executions = executions.len(),
            "Releasing all opened data units"
        );

        let mut report = ShutdownReport {
            leases_closed: leases.len(),
            ..ShutdownReport::default()
        };
        for lease in &leases {
            if !close_lease(lease) {
                report.failed_releases += 1;
            }
        }
        for execution_id in executions {
            self.release_repository(execution_id);
            report.executions_released.push(execution_id);
        }

        info!("Releasing all opened data units...done");
        report
    }

    pub fn active_leases(&self) -> Vec<LeaseInfo> {
        self.lock().infos()
    }

    pub fn lease(&self, key: &str) -> Option<LeaseInfo> {
        self.lock().get(key).map(Lease::info)
    }

    /// Number of live leases referencing `execution_id`.
    pub fn usage(&self, execution_id: ExecutionId) -> usize {
        self.lock().usage(execution_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn pool(&self) -> &Arc<dyn RepositoryPool> {
        &self.pool
    }

    // A panic inside `open` poisons the mutex before any mutation happened.
    fn lock(&self) -> MutexGuard<'_, LeaseTable> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_locked(&self, table: &mut LeaseTable, key: &str) -> bool {
        let Some(lease) = table.remove(key) else {
            return false;
        };
        info!(resource_key = %key, lease_id = %lease.id, "Lease released");
        close_lease(&lease);
        self.release_idle(table);
        true
    }

    fn release_idle(&self, table: &mut LeaseTable) -> Vec<ExecutionId> {
        let mut released = Vec::new();
        while let Some(execution_id) = table.next_idle_execution() {
            self.release_repository(execution_id);
            released.push(execution_id);
        }
        released
    }

    fn release_repository(&self, execution_id: ExecutionId) {
        info!(execution_id, "Closing repository for execution");
        if let Err(e) = self.pool.release(execution_id) {
            warn!(execution_id, error = %e, "Can't release repository");
        }
    }
}

/// Release the lease's data unit. The table slot is already gone; a failed
/// release may leak the underlying storage handle.
fn close_lease(lease: &Lease) -> bool {
    match lease.resource.release() {
        Ok(()) => true,
        Err(e) => {
            warn!(
                resource_key = %lease.resource_key,
                lease_id = %lease.id,
                error = %e,
                "Can't release data unit"
            );
            false
        }
    }
}
