//! `StoreConfig` defaults, environment lookup and validation.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use crate::config::{
        ByteOrder, ConfigError, ENV_BYTE_ORDER, ENV_IO_TYPE, ENV_TMPDIR, IoStrategy, StoreConfig,
    };

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.byte_order, ByteOrder::Native);
        assert_eq!(config.io_strategy, IoStrategy::Mapped);
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.initial_buckets, 2000);
        config.validate().unwrap();
    }

    #[test]
    fn lookup_overrides_every_field() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            (ENV_BYTE_ORDER, "little_endian"),
            (ENV_IO_TYPE, "explicit"),
            (ENV_TMPDIR, "/var/tmp/slots"),
        ]));
        assert_eq!(config.byte_order, ByteOrder::LittleEndian);
        assert_eq!(config.io_strategy, IoStrategy::Direct);
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/slots"));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            (ENV_BYTE_ORDER, "upside_down"),
            (ENV_IO_TYPE, "carrier_pigeon"),
            (ENV_TMPDIR, "   "),
        ]));
        let defaults = StoreConfig::default();
        assert_eq!(config.byte_order, defaults.byte_order);
        assert_eq!(config.io_strategy, defaults.io_strategy);
        assert_eq!(config.temp_dir, defaults.temp_dir);
    }

    #[test]
    fn empty_lookup_keeps_defaults() {
        let config = StoreConfig::from_lookup(|_| None);
        assert_eq!(config.byte_order, ByteOrder::Native);
        assert_eq!(config.io_strategy, IoStrategy::Mapped);
    }

    #[test]
    fn validate_rejects_bad_prefix_and_bucket_hint() {
        let empty_prefix = StoreConfig {
            file_prefix: String::new(),
            ..StoreConfig::default()
        };
        assert!(matches!(empty_prefix.validate(), Err(ConfigError::Invalid(_))));

        let nested_prefix = StoreConfig {
            file_prefix: "a/b".into(),
            ..StoreConfig::default()
        };
        assert!(matches!(nested_prefix.validate(), Err(ConfigError::Invalid(_))));

        let no_buckets = StoreConfig {
            initial_buckets: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(no_buckets.validate(), Err(ConfigError::Invalid(_))));
    }
}
