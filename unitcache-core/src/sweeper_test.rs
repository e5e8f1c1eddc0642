#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::cache::LeaseCache;
    use crate::clock::ManualClock;
    use crate::infrastructure::{DataUnit, DataUnitDescriptor};
    use crate::infrastructure_in_memory::{InMemoryDataUnit, InMemoryRepositoryPool};
    use crate::sweeper::{SweepDaemon, DEFAULT_SWEEP_INTERVAL};
    use crate::types::DataUnitType;

    fn descriptor(name: &str) -> DataUnitDescriptor {
        DataUnitDescriptor {
            data_unit_type: DataUnitType::Rdf,
            execution_id: 3,
            uri: format!("urn:test:{}", name),
            name: name.to_string(),
            directory: PathBuf::from(format!("/tmp/{}", name)),
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done()
    }

    #[test]
    fn test_interval_defaults_and_floor() {
        let cache = Arc::new(LeaseCache::new(Arc::new(InMemoryRepositoryPool::new())));

        assert_eq!(SweepDaemon::new(cache.clone()).interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(
            SweepDaemon::new(cache)
                .with_interval(Duration::ZERO)
                .interval(),
            Duration::from_millis(1)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_daemon_sweeps_expired_leases() {
        let clock = Arc::new(ManualClock::new(1_000));
        let pool = Arc::new(InMemoryRepositoryPool::new());
        let cache = Arc::new(LeaseCache::with_clock(pool.clone(), clock.clone()));

        cache
            .acquire(
                "k",
                3,
                |_| {
                    let unit: Arc<dyn DataUnit> = Arc::new(InMemoryDataUnit::new(&descriptor("k")));
                    Ok(unit)
                },
                Duration::from_secs(60),
            )
            .unwrap();
        clock.advance(Duration::from_secs(61));

        let shutdown = CancellationToken::new();
        let daemon = SweepDaemon::new(cache.clone()).with_interval(Duration::from_millis(20));
        let handle = tokio::spawn(daemon.run(shutdown.clone()));

        assert!(wait_until(|| cache.is_empty()).await);
        assert!(wait_until(|| pool.release_count(3) == 1).await);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("daemon did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_daemon_stops_on_cancel_before_first_sweep() {
        let cache = Arc::new(LeaseCache::new(Arc::new(InMemoryRepositoryPool::new())));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(SweepDaemon::new(cache).run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("daemon did not stop")
            .unwrap();
    }
}
