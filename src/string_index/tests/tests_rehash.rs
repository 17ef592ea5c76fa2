//! Table growth: rehash triggering, bucket counts, and lookups across
//! relocations.

#[cfg(test)]
mod tests {
    use crate::config::IoStrategy;
    use crate::string_index::tests::helpers::*;
    use crate::string_index::{PRIMES, REHASH_LIMIT, StringIndexError, find_prime};
    use rand::Rng;
    use tempfile::TempDir;

    #[test]
    fn find_prime_is_strictly_greater() {
        assert_eq!(find_prime(0).unwrap(), 503);
        assert_eq!(find_prime(503).unwrap(), 1009);
        assert_eq!(find_prime(2000).unwrap(), 2027);
        assert_eq!(find_prime(2027 * 2 - 1).unwrap(), 4057);
        assert!(matches!(
            find_prime(u64::from(*PRIMES.last().unwrap())),
            Err(StringIndexError::TooManyBuckets(_))
        ));
    }

    #[test]
    fn default_table_starts_at_2027() {
        let tmp = TempDir::new().unwrap();
        let index = new_index(&config_in(tmp.path()));
        assert_eq!(index.bucket_count().unwrap(), 2027);
        assert_eq!(index.initial_bucket_count(), 2027);
    }

    /// # Scenario
    /// Fill the smallest table up to its load limit.
    ///
    /// # Expected behavior
    /// The insert reaching 80% occupancy doubles the table; every key is
    /// still found afterwards.
    #[test]
    fn rehash_at_load_limit() {
        let tmp = TempDir::new().unwrap();
        let index = new_index(&small_config_in(tmp.path(), IoStrategy::Mapped));
        let limit = (f64::from(PRIMES[0]) * REHASH_LIMIT) as u64;

        for i in 1..limit {
            index.put(&format!("v{i}"), i).unwrap();
        }
        assert_eq!(index.bucket_count().unwrap(), PRIMES[0]);

        index.put(&format!("v{limit}"), limit).unwrap();
        assert_eq!(index.bucket_count().unwrap(), PRIMES[1]);

        for i in 1..=limit {
            assert_eq!(index.get(&format!("v{i}")).unwrap(), i);
        }
    }

    /// # Scenario
    /// Entries that wrapped past the end of the old table.
    ///
    /// # Actions
    /// 1. Insert a run of keys whose ideal buckets are the last few of the
    ///    smallest table, so the run wraps to bucket 0 and beyond.
    /// 2. Insert filler until a rehash happens.
    ///
    /// # Expected behavior
    /// Every wrapped key is still reachable under the new table size.
    #[test]
    fn wrapped_entries_survive_rehash() {
        for strategy in [IoStrategy::Mapped, IoStrategy::Direct] {
            let tmp = TempDir::new().unwrap();
            let index = new_index(&small_config_in(tmp.path(), strategy));

            let wrapped = strings_landing_in(PRIMES[0] - 3..PRIMES[0], 10);
            for (i, k) in wrapped.iter().enumerate() {
                index.put(k, 1_000 + i as u64).unwrap();
            }

            let mut i = 0;
            while index.bucket_count().unwrap() == PRIMES[0] {
                index.put(&format!("filler-{i}"), i + 1).unwrap();
                i += 1;
            }

            for (j, k) in wrapped.iter().enumerate() {
                assert_eq!(index.get(k).unwrap(), 1_000 + j as u64, "{strategy:?} {k}");
            }
            for j in 0..i {
                assert_eq!(index.get(&format!("filler-{j}")).unwrap(), j + 1);
            }
        }
    }

    #[test]
    fn multiple_rehashes_with_random_keys() {
        let tmp = TempDir::new().unwrap();
        let index = new_index(&small_config_in(tmp.path(), IoStrategy::Mapped));
        let mut rng = rand::rng();

        let mut expected = std::collections::HashMap::new();
        while expected.len() < 5_000 {
            let len = rng.random_range(1..40);
            let key: String = (0..len)
                .map(|_| char::from(rng.random_range(b'a'..=b'z')))
                .collect();
            let value = rng.random_range(1..=crate::string_index::MAX_VALUE);
            index.put(&key, value).unwrap();
            expected.insert(key, value);
        }

        assert_eq!(index.len().unwrap() as usize, expected.len());
        assert!(index.bucket_count().unwrap() >= PRIMES[4]);
        for (key, value) in &expected {
            assert_eq!(index.get(key).unwrap(), *value, "{key}");
        }
    }

    #[test]
    fn load_factor_stays_below_limit() {
        let tmp = TempDir::new().unwrap();
        let index = new_index(&small_config_in(tmp.path(), IoStrategy::Mapped));

        for i in 0..3_000u64 {
            index.put(&i.to_string(), i + 1).unwrap();
            let used = f64::from(index.len().unwrap());
            let buckets = f64::from(index.bucket_count().unwrap());
            assert!(used / buckets < REHASH_LIMIT, "at {i}: {used}/{buckets}");
        }
    }
}
