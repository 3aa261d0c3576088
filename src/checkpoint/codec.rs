use std::path::Path;

use crate::error::CheckpointError;

/// Training steps per checkpoint index unit.
pub const STEPS_PER_INDEX: u64 = 1000;

/// Filename prefix shared by every checkpoint written by the trainer.
pub const CHECKPOINT_PREFIX: &str = "model.ckpt";

/// Suffix of the parameter shard that identifies a checkpoint on disk.
pub const DATA_SUFFIX: &str = "data-00000-of-00001";

/// Decode the checkpoint index from a filename like
/// `.../model.ckpt-12000.data-00000-of-00001` (yields `12`).
///
/// Only the final path component is inspected. The step count is the run of
/// characters between the first `-` and the next `.`; it is divided by
/// [`STEPS_PER_INDEX`], truncating.
pub fn filename_to_index(path: impl AsRef<Path>) -> Result<u64, CheckpointError> {
    let path = path.as_ref();
    let malformed = || CheckpointError::MalformedFilename(path.display().to_string());

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(malformed)?;
    let (_, rest) = name.split_once('-').ok_or_else(malformed)?;
    let digits = rest.split('.').next().unwrap_or_default();
    let steps: u64 = digits.parse().map_err(|_| malformed())?;
    Ok(steps / STEPS_PER_INDEX)
}

/// Encode a checkpoint index as the parameter-shard filename.
pub fn index_to_filename(index: u64) -> String {
    format!("{CHECKPOINT_PREFIX}-{index}000.{DATA_SUFFIX}")
}

/// Whether a directory entry looks like a checkpoint parameter shard
/// (the `*.data*` pattern).
pub fn is_checkpoint_data_file(name: &str) -> bool {
    name.contains(".data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_to_filename() {
        assert_eq!(index_to_filename(7), "model.ckpt-7000.data-00000-of-00001");
        assert_eq!(index_to_filename(0), "model.ckpt-0000.data-00000-of-00001");
    }

    #[test]
    fn test_filename_to_index_full_path() {
        let idx = filename_to_index("/ckpts/run/model.ckpt-45000.data-00000-of-00001").unwrap();
        assert_eq!(idx, 45);
    }

    #[test]
    fn test_roundtrip() {
        for n in [0, 1, 9, 10, 99, 250, 1234, 100_000] {
            assert_eq!(filename_to_index(index_to_filename(n)).unwrap(), n);
        }
    }

    #[test]
    fn test_non_multiple_truncates() {
        assert_eq!(filename_to_index("model.ckpt-5500.data-00000-of-00001").unwrap(), 5);
    }

    #[test]
    fn test_malformed_names() {
        for name in ["model.ckpt.data", "model.ckpt-abc.data-0", "checkpoint", ""] {
            let err = filename_to_index(name).unwrap_err();
            assert!(
                matches!(err, CheckpointError::MalformedFilename(_)),
                "expected MalformedFilename for {name:?}, got: {err}"
            );
        }
    }

    #[test]
    fn test_data_file_pattern() {
        assert!(is_checkpoint_data_file("model.ckpt-1000.data-00000-of-00001"));
        assert!(!is_checkpoint_data_file("model.ckpt-1000.index"));
        assert!(!is_checkpoint_data_file("checkpoint"));
    }
}
