#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::cache::LeaseCache;
    use crate::clock::ManualClock;
    use crate::error::{DataUnitError, LeaseError};
    use crate::infrastructure::DataUnit;
    use crate::infrastructure_in_memory::{InMemoryDataUnitFactory, InMemoryRepositoryPool};
    use crate::locator::DirectoryLocator;
    use crate::manager::{DataUnitManager, CLOSE_TIME_LONG, CLOSE_TIME_SHORT};
    use crate::types::{DataUnitInfo, DataUnitRef, DataUnitType, ExecutionInfo};

    const T0: u64 = 5_000_000;

    struct Fixture {
        manager: DataUnitManager,
        factory: Arc<InMemoryDataUnitFactory>,
        pool: Arc<InMemoryRepositoryPool>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(factory: InMemoryDataUnitFactory, working_dir: &str) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let pool = Arc::new(InMemoryRepositoryPool::new());
        let factory = Arc::new(factory);
        let cache = Arc::new(LeaseCache::with_clock(pool.clone(), clock.clone()));
        let manager = DataUnitManager::new(
            cache,
            Arc::new(DirectoryLocator::new(working_dir)),
            factory.clone(),
        );
        Fixture {
            manager,
            factory,
            pool,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryDataUnitFactory::new(), "/var/unitcache")
    }

    fn execution() -> ExecutionInfo {
        ExecutionInfo::new(5)
            .with_data_unit(11, DataUnitInfo::new(0, "output", DataUnitType::Rdf))
            .with_data_unit(11, DataUnitInfo::new(1, "rejected", DataUnitType::Rdf))
            .with_data_unit(12, DataUnitInfo::new(0, "files", DataUnitType::Files))
    }

    #[test]
    fn test_data_unit_is_created_loaded_and_cached() {
        let f = fixture();
        let execution = execution();

        let unit = f
            .manager
            .data_unit_for_browse(&execution, 11, 0)
            .unwrap()
            .unwrap();
        assert_eq!(unit.name(), "output");
        assert_eq!(unit.uri(), "urn:unitcache:dataunit:exec_5_dpu_11_du_0");
        assert_eq!(
            unit.directory(),
            PathBuf::from("/var/unitcache/exec_5/dpu_11/du_0")
        );

        f.manager.data_unit_for_browse(&execution, 11, 0).unwrap();
        assert_eq!(f.factory.created_count(), 1);
        assert!(f.factory.created()[0].is_loaded());

        let lease = f
            .manager
            .cache()
            .lease("/var/unitcache/exec_5/dpu_11/du_0")
            .unwrap();
        assert_eq!(lease.execution_id, 5);
        assert_eq!(lease.data_unit, "output");
    }

    #[test]
    fn test_download_lifetime_outlives_browse() {
        let f = fixture();
        let execution = execution();
        let key = "/var/unitcache/exec_5/dpu_11/du_0";

        f.manager.data_unit_for_download(&execution, 11, 0).unwrap();
        f.manager.data_unit_for_browse(&execution, 11, 0).unwrap();

        let lease = f.manager.cache().lease(key).unwrap();
        assert_eq!(lease.expires_at, T0 + CLOSE_TIME_LONG.as_millis() as u64);

        f.clock.advance(CLOSE_TIME_SHORT);
        f.manager.cache().sweep();
        assert!(f.manager.cache().lease(key).is_some());

        f.clock.set(T0 + CLOSE_TIME_LONG.as_millis() as u64);
        f.manager.cache().sweep();
        assert!(f.manager.cache().lease(key).is_none());
        assert!(f.factory.created()[0].is_released());
        assert_eq!(f.pool.released(), vec![5]);
    }

    #[test]
    fn test_units_of_one_execution_share_the_counter() {
        let f = fixture();
        let execution = execution();

        f.manager.data_unit_for_browse(&execution, 11, 0).unwrap();
        f.manager.data_unit_for_browse(&execution, 11, 1).unwrap();
        f.manager.data_unit_for_browse(&execution, 12, 0).unwrap();

        assert_eq!(f.factory.created_count(), 3);
        assert_eq!(f.manager.cache().usage(5), 3);
    }

    #[test]
    fn test_unknown_dpu_or_data_unit_yields_none() {
        let f = fixture();
        let execution = execution();

        assert!(f.manager.data_unit_for_browse(&execution, 99, 0).unwrap().is_none());
        assert!(f.manager.data_unit_for_browse(&execution, 11, 7).unwrap().is_none());
        assert_eq!(f.factory.created_count(), 0);
        assert!(f.manager.cache().is_empty());
    }

    #[test]
    fn test_missing_working_dir_is_invalid_argument() {
        let f = fixture_with(InMemoryDataUnitFactory::new(), "");

        let err = f
            .manager
            .data_unit_for_browse(&execution(), 11, 0)
            .err()
            .unwrap();
        assert!(matches!(err, LeaseError::InvalidArgument(_)));
        assert!(f.manager.cache().is_empty());
    }

    #[test]
    fn test_load_failure_releases_half_created_unit() {
        let f = fixture_with(InMemoryDataUnitFactory::failing_load(), "/var/unitcache");

        let err = f
            .manager
            .data_unit_for_browse(&execution(), 11, 0)
            .err()
            .unwrap();

        assert!(matches!(
            err,
            LeaseError::ResourceOpen {
                source: DataUnitError::Load { .. },
                ..
            }
        ));
        let created = f.factory.created();
        assert_eq!(created.len(), 1);
        assert!(created[0].is_released());
        assert!(f.manager.cache().is_empty());
        assert_eq!(f.manager.cache().usage(5), 0);
        assert_eq!(f.pool.released(), vec![5]);
    }

    #[test]
    fn test_resource_key_is_the_directory() {
        let f = fixture();
        let du = DataUnitRef::new(5, 11, 0);

        assert_eq!(
            f.manager.resource_key(&du).unwrap(),
            "/var/unitcache/exec_5/dpu_11/du_0"
        );
        f.manager.data_unit_for_browse(&execution(), 11, 0).unwrap();
        assert!(f
            .manager
            .cache()
            .lease(&f.manager.resource_key(&du).unwrap())
            .is_some());

        let broken = fixture_with(InMemoryDataUnitFactory::new(), "");
        assert!(matches!(
            broken.manager.resource_key(&du),
            Err(LeaseError::InvalidArgument(_))
        ));
    }
}
