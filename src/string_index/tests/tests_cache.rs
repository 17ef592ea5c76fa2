//! Front cache behavior: transparent to results, bounded, and reset on
//! `clear`.

#[cfg(test)]
mod tests {
    use crate::string_index::StringIndex;
    use crate::string_index::tests::helpers::*;
    use tempfile::TempDir;

    fn run_workload(index: &StringIndex) -> Vec<u64> {
        let mut results = Vec::new();
        for i in 0..500u64 {
            index.put(&format!("w{}", i % 150), i + 1).unwrap();
            results.push(index.get(&format!("w{}", (i * 7) % 200)).unwrap());
            results.push(index.get_and_put(&format!("w{}", i % 90), 0).unwrap());
        }
        results
    }

    /// # Scenario
    /// The same workload against a cached and an uncached index.
    ///
    /// # Expected behavior
    /// Every observed result is identical.
    #[test]
    fn cache_is_transparent() {
        let tmp = TempDir::new().unwrap();
        let cached = new_index(&config_in(tmp.path()));
        let uncached = new_index(&crate::config::StoreConfig {
            cache_capacity: 0,
            ..config_in(tmp.path())
        });

        assert_eq!(run_workload(&cached), run_workload(&uncached));
        assert_eq!(uncached.cached_entries(), 0);
    }

    #[test]
    fn cache_is_bounded() {
        let tmp = TempDir::new().unwrap();
        let index = new_index(&crate::config::StoreConfig {
            cache_capacity: 8,
            ..config_in(tmp.path())
        });

        for i in 0..100u64 {
            index.put(&i.to_string(), i + 1).unwrap();
        }
        assert_eq!(index.cached_entries(), 8);
        for i in 0..100u64 {
            assert_eq!(index.get(&i.to_string()).unwrap(), i + 1);
        }
    }

    #[test]
    fn overwrite_refreshes_cache() {
        let tmp = TempDir::new().unwrap();
        let index = new_index(&config_in(tmp.path()));

        index.put("k", 1).unwrap();
        assert_eq!(index.get("k").unwrap(), 1);
        index.put("k", 2).unwrap();
        assert_eq!(index.get("k").unwrap(), 2);
    }

    #[test]
    fn clear_empties_cache() {
        let tmp = TempDir::new().unwrap();
        let index = new_index(&config_in(tmp.path()));

        index.put("stale", 5).unwrap();
        assert_eq!(index.get("stale").unwrap(), 5);
        index.clear().unwrap();

        assert_eq!(index.cached_entries(), 0);
        assert_eq!(index.get("stale").unwrap(), 0);
    }
}
