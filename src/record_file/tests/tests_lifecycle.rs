//! Open, close, reopen, clear and delete.
//!
//! ## See also
//! - [`tests_regions`]: unmap and lazy remapping of the mapped strategy

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use crate::config::IoStrategy;
    use crate::record_file::tests::helpers::*;
    use crate::record_file::{self, RecordFileError};
    use tempfile::TempDir;

    /// # Scenario
    /// Values survive a close → reopen cycle.
    ///
    /// # Expected behavior
    /// Every value reads back and the size is preserved exactly, because
    /// `close(true)` truncates the file to its logical size.
    #[test]
    fn round_trip_across_reopen() {
        for strategy in STRATEGIES {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("reopen");

            let file = open_with(&path, strategy);
            for key in 0..2048u64 {
                file.put_long(key, !key).unwrap();
            }
            file.force().unwrap();
            file.close(true).unwrap();
            assert_eq!(file_len(&path), 2048 * 8);

            let file = open_with(&path, strategy);
            assert_eq!(file.size().unwrap(), 2048);
            for key in 0..2048u64 {
                assert_eq!(file.get_long(key).unwrap(), !key);
            }
        }
    }

    #[test]
    fn files_are_interchangeable_between_strategies() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared");

        let mapped = open_with(&path, IoStrategy::Mapped);
        mapped.put_int(9, 0xCAFE).unwrap();
        mapped.close(true).unwrap();

        let direct = open_with(&path, IoStrategy::Direct);
        assert_eq!(direct.size().unwrap(), 5);
        assert_eq!(direct.get_int(9).unwrap(), 0xCAFE);
    }

    /// # Scenario
    /// An existing file whose length is not a multiple of eight.
    ///
    /// # Expected behavior
    /// The partial trailing slot is truncated away on open.
    #[test]
    fn partial_trailing_slot_is_truncated_on_open() {
        for strategy in STRATEGIES {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("ragged");
            let mut raw = fs::File::create(&path).unwrap();
            raw.write_all(&[1u8; 21]).unwrap();
            drop(raw);

            let file = open_with(&path, strategy);
            assert_eq!(file.size().unwrap(), 2);
            assert_eq!(file.get_byte(15).unwrap(), 1);
            assert_eq!(file.get_byte(16).unwrap(), 0);
            file.close(true).unwrap();
            assert_eq!(file_len(&path), 16);
        }
    }

    #[test]
    fn close_without_truncate_keeps_physical_length() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("untruncated");

        let file = open_with(&path, IoStrategy::Mapped);
        file.put_long(0, 1).unwrap();
        file.close(false).unwrap();

        // A whole region was allocated; reopening treats it as trailing zeros.
        let len = file_len(&path);
        assert!(len >= 8);
        let file = open_with(&path, IoStrategy::Mapped);
        assert_eq!(file.size().unwrap(), len / 8);
        assert_eq!(file.get_long(0).unwrap(), 1);
        assert_eq!(file.get_long(1).unwrap(), 0);
    }

    #[test]
    fn operations_after_close_fail() {
        for strategy in STRATEGIES {
            let tmp = TempDir::new().unwrap();
            let file = open_with(&tmp.path().join("closed"), strategy);
            file.put_long(0, 1).unwrap();
            file.close(true).unwrap();

            assert!(matches!(file.get_long(0), Err(RecordFileError::Closed(_))));
            assert!(matches!(file.put_long(0, 2), Err(RecordFileError::Closed(_))));
            assert!(matches!(file.size(), Err(RecordFileError::Closed(_))));
            // Closing again is harmless.
            file.close(true).unwrap();
        }
    }

    #[test]
    fn clear_truncates_to_empty() {
        for strategy in STRATEGIES {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("clear");
            let file = open_with(&path, strategy);

            file.put_long(300, 3).unwrap();
            file.clear().unwrap();
            assert_eq!(file.size().unwrap(), 0);
            assert_eq!(file.get_long(300).unwrap(), 0);
            assert_eq!(file_len(&path), 0);
        }
    }

    #[test]
    fn delete_removes_the_file() {
        for strategy in STRATEGIES {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("doomed");
            let file = open_with(&path, strategy);
            file.put_long(10, 10).unwrap();

            file.delete().unwrap();
            assert!(!path.exists());
            assert!(matches!(file.get_long(10), Err(RecordFileError::Closed(_))));
        }
    }

    #[test]
    fn drop_closes_and_truncates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dropped");
        {
            let file = open_with(&path, IoStrategy::Mapped);
            file.put_long(2, 22).unwrap();
        }
        assert_eq!(file_len(&path), 24);
    }

    #[test]
    fn open_temp_creates_prefixed_file_in_temp_dir() {
        let tmp = TempDir::new().unwrap();
        let config = crate::config::StoreConfig {
            temp_dir: tmp.path().join("nested"),
            file_prefix: "unit".into(),
            ..config_for(IoStrategy::Mapped)
        };

        let file = record_file::open_temp(&config, "longs", ".lf").unwrap();
        let name = file.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("unit-longs-"), "{name}");
        assert!(name.ends_with(".lf"), "{name}");
        assert_eq!(file.path().parent().unwrap(), tmp.path().join("nested"));

        file.put_long(1, 1).unwrap();
        let path = file.path().to_path_buf();
        file.delete().unwrap();
        assert!(!path.exists());
    }
}
