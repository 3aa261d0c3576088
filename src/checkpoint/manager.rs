use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoint::codec::{filename_to_index, index_to_filename, is_checkpoint_data_file};
use crate::error::CheckpointError;

/// Read-only view over a training run's checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        CheckpointManager {
            checkpoint_dir: checkpoint_dir.into(),
        }
    }

    /// Checkpoint directory for `run_name` under `ckpt_root`.
    pub fn for_run(ckpt_root: &Path, run_name: &str) -> Self {
        Self::new(ckpt_root.join(run_name))
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Path of the parameter shard for checkpoint `index`.
    pub fn path_for(&self, index: u64) -> PathBuf {
        self.checkpoint_dir.join(index_to_filename(index))
    }

    /// Every checkpoint index present on disk, ascending.
    ///
    /// A file matching the shard pattern whose name cannot be decoded is an
    /// error rather than being skipped.
    pub fn available_indices(&self) -> Result<Vec<u64>, CheckpointError> {
        if !self.checkpoint_dir.is_dir() {
            return Err(CheckpointError::DirNotFound(self.checkpoint_dir.clone()));
        }
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name();
            if !is_checkpoint_data_file(&name.to_string_lossy()) {
                continue;
            }
            indices.push(filename_to_index(&path)?);
        }
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }

    /// Raw parameter bytes of checkpoint `index`.
    pub fn read(&self, index: u64) -> Result<Vec<u8>, CheckpointError> {
        let path = self.path_for(index);
        if !path.is_file() {
            return Err(CheckpointError::Missing { index, path });
        }
        Ok(fs::read(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"params").unwrap();
    }

    #[test]
    fn test_available_indices_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for n in [12, 3, 20] {
            touch(dir.path(), &index_to_filename(n));
        }
        touch(dir.path(), "model.ckpt-3000.index");
        touch(dir.path(), "model.ckpt-3000.meta");
        touch(dir.path(), "checkpoint");
        fs::create_dir(dir.path().join("events")).unwrap();

        let manager = CheckpointManager::new(dir.path());
        assert_eq!(manager.available_indices().unwrap(), vec![3, 12, 20]);
    }

    #[test]
    fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::for_run(dir.path(), "no-such-run");
        let err = manager.available_indices().unwrap_err();
        assert!(
            matches!(err, CheckpointError::DirNotFound(_)),
            "expected DirNotFound, got: {err}"
        );
    }

    #[test]
    fn test_malformed_shard_name_is_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "model.ckpt-oops.data-00000-of-00001");
        let manager = CheckpointManager::new(dir.path());
        assert!(matches!(
            manager.available_indices(),
            Err(CheckpointError::MalformedFilename(_))
        ));
    }

    #[test]
    fn test_read_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let err = manager.read(7).unwrap_err();
        assert!(
            matches!(err, CheckpointError::Missing { index: 7, .. }),
            "expected Missing, got: {err}"
        );
    }

    #[test]
    fn test_read_existing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &index_to_filename(4));
        let manager = CheckpointManager::new(dir.path());
        assert_eq!(manager.read(4).unwrap(), b"params");
        assert!(manager.path_for(4).ends_with("model.ckpt-4000.data-00000-of-00001"));
    }
}
