#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::clock::{duration_ms, Clock, ManualClock, SystemClock};
    use crate::error::{DataUnitError, LocateError, PoolError};
    use crate::infrastructure::{
        DataUnit, DataUnitDescriptor, DataUnitFactory, RepositoryPool, ResourceLocator,
    };
    use crate::infrastructure_in_memory::{InMemoryDataUnitFactory, InMemoryRepositoryPool};
    use crate::locator::DirectoryLocator;
    use crate::types::{DataUnitRef, DataUnitType};

    fn descriptor() -> DataUnitDescriptor {
        DataUnitDescriptor {
            data_unit_type: DataUnitType::Files,
            execution_id: 2,
            uri: DataUnitRef::new(2, 4, 1).uri(),
            name: "input".to_string(),
            directory: PathBuf::from("/work/exec_2/dpu_4/du_1"),
        }
    }

    #[test]
    fn test_locator_layout_is_deterministic() {
        let locator = DirectoryLocator::new("/work");
        let du = DataUnitRef::new(2, 4, 1);

        let first = locator.data_unit_dir(&du).unwrap();
        assert_eq!(first, PathBuf::from("/work/exec_2/dpu_4/du_1"));
        assert_eq!(locator.data_unit_dir(&du).unwrap(), first);
        assert_ne!(
            locator.data_unit_dir(&DataUnitRef::new(2, 4, 2)).unwrap(),
            first
        );
    }

    #[test]
    fn test_locator_without_working_dir() {
        let locator = DirectoryLocator::new("");
        assert!(matches!(
            locator.data_unit_dir(&DataUnitRef::new(1, 1, 0)),
            Err(LocateError::MissingWorkingDir)
        ));
    }

    #[test]
    fn test_data_unit_ids() {
        let du = DataUnitRef::new(7, 13, 2);
        assert_eq!(du.data_unit_id(), "exec_7_dpu_13_du_2");
        assert_eq!(du.uri(), "urn:unitcache:dataunit:exec_7_dpu_13_du_2");
    }

    #[test]
    fn test_data_unit_type_parsing() {
        assert_eq!("rdf".parse::<DataUnitType>(), Ok(DataUnitType::Rdf));
        assert_eq!("FILES".parse::<DataUnitType>(), Ok(DataUnitType::Files));
        assert!("graph".parse::<DataUnitType>().is_err());
        assert_eq!(DataUnitType::Relational.to_string(), "RELATIONAL");
    }

    #[test]
    fn test_in_memory_unit_lifecycle() {
        let factory = InMemoryDataUnitFactory::new();
        let unit = factory.create(&descriptor()).unwrap();

        assert_eq!(unit.name(), "input");
        unit.load().unwrap();
        unit.release().unwrap();
        // Releasing twice is reported
        assert!(matches!(unit.release(), Err(DataUnitError::Release { .. })));

        let created = factory.created();
        assert!(created[0].is_loaded());
        assert!(created[0].is_released());
    }

    #[test]
    fn test_in_memory_failing_load() {
        let factory = InMemoryDataUnitFactory::failing_load();
        let unit = factory.create(&descriptor()).unwrap();
        assert!(matches!(unit.load(), Err(DataUnitError::Load { .. })));
    }

    #[test]
    fn test_in_memory_pool_records_releases() {
        let pool = InMemoryRepositoryPool::new();
        pool.fail_release_for(2);

        pool.release(1).unwrap();
        assert!(matches!(
            pool.release(2),
            Err(PoolError::Release { execution_id: 2, .. })
        ));
        assert_eq!(pool.released(), vec![1, 2]);
        assert_eq!(pool.release_count(2), 1);
    }

    #[test]
    fn test_in_memory_pool_probe() {
        let pool = InMemoryRepositoryPool::new();
        pool.fail_probes(1);

        assert!(pool.probe().is_err());
        assert!(pool.probe().is_ok());
    }

    #[test]
    fn test_clocks_report_epoch_millis() {
        // 2020-09-13 in epoch milliseconds
        assert!(SystemClock.now_ms() > 1_600_000_000_000);
        assert_eq!(duration_ms(Duration::from_secs(u64::MAX)), u64::MAX);

        let clock = ManualClock::new(10);
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now_ms(), 15);
    }
}
