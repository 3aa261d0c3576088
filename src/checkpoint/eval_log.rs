use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::CheckpointError;

/// How the already-evaluated high-water mark is derived from the log.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum HighWaterMarkPolicy {
    /// The index on the last line wins, even if an earlier line is larger.
    LastLine,
    /// The largest index found on any line.
    #[default]
    MaxOfAll,
}

/// Append-only, tab-delimited evaluation log. Each line starts with the
/// evaluated checkpoint index.
#[derive(Debug, Clone)]
pub struct EvalLog {
    path: PathBuf,
}

impl EvalLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EvalLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the leading checkpoint index of every non-blank line.
    pub fn evaluated_indices(&self) -> Result<Vec<u64>, CheckpointError> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut indices = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let field = line.split('\t').next().unwrap_or_default().trim();
            let index = field.parse::<u64>().map_err(|_| CheckpointError::LogParse {
                path: self.path.clone(),
                line_no: i + 1,
                line: line.to_string(),
            })?;
            indices.push(index);
        }
        Ok(indices)
    }

    /// The checkpoint index treated as already evaluated; 0 when the log
    /// does not exist or is empty.
    pub fn high_water_mark(&self, policy: HighWaterMarkPolicy) -> Result<u64, CheckpointError> {
        let indices = self.evaluated_indices()?;
        let mark = match policy {
            HighWaterMarkPolicy::LastLine => indices.last().copied(),
            HighWaterMarkPolicy::MaxOfAll => indices.iter().max().copied(),
        };
        Ok(mark.unwrap_or(0))
    }

    /// Open the log for appending, creating it if needed.
    pub fn open_writer(&self) -> Result<EvalLogWriter, CheckpointError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(EvalLogWriter { file })
    }
}

/// Handle that appends evaluation reports and flushes after each one.
pub struct EvalLogWriter {
    file: File,
}

impl EvalLogWriter {
    /// Append one report. A missing trailing newline is added so the next
    /// report starts on its own line.
    pub fn append(&mut self, report: &str) -> Result<(), CheckpointError> {
        self.file.write_all(report.as_bytes())?;
        if !report.ends_with('\n') {
            self.file.write_all(b"\n")?;
        }
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_log(dir: &Path, content: &str) -> EvalLog {
        let path = dir.join("evaluations.txt");
        fs::write(&path, content).unwrap();
        EvalLog::new(path)
    }

    #[test]
    fn test_missing_log_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let log = EvalLog::new(dir.path().join("missing.txt"));
        for policy in [HighWaterMarkPolicy::LastLine, HighWaterMarkPolicy::MaxOfAll] {
            assert_eq!(log.high_water_mark(policy).unwrap(), 0);
        }
    }

    #[test]
    fn test_last_line_policy_takes_last_value() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path(), "5\tmAP=0.1\n12\tmAP=0.3\n9\tmAP=0.2\n");
        assert_eq!(log.high_water_mark(HighWaterMarkPolicy::LastLine).unwrap(), 9);
    }

    #[test]
    fn test_max_of_all_policy_takes_max() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path(), "5\tmAP=0.1\n12\tmAP=0.3\n9\tmAP=0.2\n");
        assert_eq!(log.high_water_mark(HighWaterMarkPolicy::MaxOfAll).unwrap(), 12);
    }

    #[test]
    fn test_default_policy_is_max_of_all() {
        assert_eq!(HighWaterMarkPolicy::default(), HighWaterMarkPolicy::MaxOfAll);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path(), "3\ta\n\n7\tb\n\n");
        assert_eq!(log.evaluated_indices().unwrap(), vec![3, 7]);
    }

    #[test]
    fn test_garbage_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path(), "3\ta\nnot-a-number\tb\n");
        let err = log.high_water_mark(HighWaterMarkPolicy::MaxOfAll).unwrap_err();
        assert!(
            matches!(err, CheckpointError::LogParse { line_no: 2, .. }),
            "expected LogParse on line 2, got: {err}"
        );
    }

    #[test]
    fn test_append_adds_newline_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let log = EvalLog::new(dir.path().join("run").join("evaluations.txt"));

        let mut writer = log.open_writer().unwrap();
        writer.append("4\tmAP=0.5").unwrap();
        writer.append("8\tmAP=0.6\n").unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "4\tmAP=0.5\n8\tmAP=0.6\n");
        assert_eq!(log.high_water_mark(HighWaterMarkPolicy::LastLine).unwrap(), 8);
    }

    #[test]
    fn test_append_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path(), "1\told\n");
        log.open_writer().unwrap().append("2\tnew\n").unwrap();
        assert_eq!(log.evaluated_indices().unwrap(), vec![1, 2]);
    }
}
