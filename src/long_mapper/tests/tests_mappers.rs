//! Both mapper implementations answer identically.

#[cfg(test)]
mod tests {
    use crate::config::{IoStrategy, StoreConfig};
    use crate::long_mapper::{self, LongMapper, MemLongMapper};
    use crate::{RecordFileError, StoreError};
    use tempfile::TempDir;

    fn exercise(mapper: &dyn LongMapper) {
        assert_eq!(mapper.get_long(5).unwrap(), 0);

        mapper.put_long(5, 50).unwrap();
        mapper.put_long(1_000, 7).unwrap();
        mapper.put_long(5, 51).unwrap();

        assert_eq!(mapper.get_long(5).unwrap(), 51);
        assert_eq!(mapper.get_long(1_000).unwrap(), 7);
        assert_eq!(mapper.get_long(999).unwrap(), 0);

        mapper.put_long(1_000, 0).unwrap();
        assert_eq!(mapper.get_long(1_000).unwrap(), 0);
    }

    #[test]
    fn memory_mapper() {
        let mapper = MemLongMapper::new();
        exercise(&mapper);
        mapper.delete().unwrap();
        assert_eq!(mapper.get_long(5).unwrap(), 0);
    }

    #[test]
    fn file_mapper_for_each_strategy() {
        for io_strategy in [IoStrategy::Mapped, IoStrategy::Direct] {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("longs");
            let config = StoreConfig {
                io_strategy,
                ..StoreConfig::default()
            };

            let mapper = long_mapper::open(&path, &config).unwrap();
            exercise(mapper.as_ref());

            mapper.delete().unwrap();
            assert!(!path.exists());
            assert!(matches!(
                mapper.get_long(5),
                Err(StoreError::RecordFile(RecordFileError::Closed(_)))
            ));
        }
    }

    /// # Scenario
    /// Swapping implementations behind `Box<dyn LongMapper>`.
    ///
    /// # Expected behavior
    /// The same call sequence yields the same observations.
    #[test]
    fn implementations_are_interchangeable() {
        let tmp = TempDir::new().unwrap();
        let mappers: Vec<Box<dyn LongMapper>> = vec![
            Box::new(MemLongMapper::new()),
            long_mapper::open(tmp.path().join("disk"), &StoreConfig::default()).unwrap(),
        ];

        let observed: Vec<Vec<u64>> = mappers
            .iter()
            .map(|m| {
                for k in (0..200u64).step_by(3) {
                    m.put_long(k, k * k + 1).unwrap();
                }
                (0..200u64).map(|k| m.get_long(k).unwrap()).collect()
            })
            .collect();
        assert_eq!(observed[0], observed[1]);
    }

    #[test]
    fn file_mapper_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("persist");
        let config = StoreConfig::default();
        {
            let mapper = long_mapper::open(&path, &config).unwrap();
            mapper.put_long(12, 34).unwrap();
        }
        let mapper = long_mapper::open(&path, &config).unwrap();
        assert_eq!(mapper.get_long(12).unwrap(), 34);
    }
}
