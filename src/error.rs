use std::path::PathBuf;

/// Errors that can occur while reading checkpoints and the evaluation log.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("malformed checkpoint filename: {0}")]
    MalformedFilename(String),

    #[error("checkpoint {index} not found at {path}")]
    Missing { index: u64, path: PathBuf },

    #[error("failed to parse line {line_no} of {path}: {line:?}")]
    LogParse {
        path: PathBuf,
        line_no: usize,
        line: String,
    },

    #[error("failed to load parameters from {path}: {reason}")]
    RecordLoad { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of checkpoint selection when no evaluation can take place.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("nothing to evaluate: no checkpoint at or above index {start}")]
    NothingToEvaluate { start: u64 },
}

/// Errors that can occur while loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read annotations from {path}: {source}")]
    AnnotationRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse annotations from {path}: {source}")]
    AnnotationParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("annotation references unknown category {0}")]
    UnknownCategory(u64),

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Errors that can occur while evaluating a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("dataset {0} has no samples")]
    EmptyDataset(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("tensor data error: {0}")]
    Tensor(String),

    #[error("segmentation of {file_name} has {actual} labels, expected {expected}")]
    SegmentationSize {
        file_name: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Invalid combination of command-line flags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("a checkpoint is required: pass --ckpt N (N > 0) or --batch-eval")]
    NoCheckpoint,

    #[error("either --detect or --segment must be given")]
    NoTask,
}

/// Errors that can occur while installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_error_display() {
        let err = SelectionError::NothingToEvaluate { start: 13 };
        assert_eq!(
            err.to_string(),
            "nothing to evaluate: no checkpoint at or above index 13"
        );
    }

    #[test]
    fn test_log_parse_error_display() {
        let err = CheckpointError::LogParse {
            path: PathBuf::from("eval.txt"),
            line_no: 3,
            line: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "failed to parse line 3 of eval.txt: \"abc\"");
    }

    #[test]
    fn test_usage_error_display() {
        assert_eq!(
            UsageError::NoTask.to_string(),
            "either --detect or --segment must be given"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("eval.step must be >= 1".to_string());
        assert_eq!(
            err.to_string(),
            "config validation error: eval.step must be >= 1"
        );
    }
}
