use std::path::{Path, PathBuf};

use crate::checkpoint::HighWaterMarkPolicy;
use crate::error::ConfigError;
use crate::net::NetConfig;
use crate::profiler::ProfileOptions;

/// Filesystem locations shared by every run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Parent of every run's checkpoint directory.
    pub ckpt_root: PathBuf,
    /// Parent of the `VOCdevkit/` and `coco/` dataset trees.
    pub dataset_root: PathBuf,
    /// Evaluation log filename inside the run directory.
    pub evaluation_logfile: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            ckpt_root: PathBuf::from("checkpoints"),
            dataset_root: PathBuf::from("datasets"),
            evaluation_logfile: "evaluations.txt".to_string(),
        }
    }
}

/// Evaluation and batch-selection settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub min_ckpt: u64,
    pub step: u64,
    pub voc_iou_thresh: f32,
    pub conf_thresh: f32,
    pub nms_thresh: f32,
    pub top_k: usize,
    pub hwm_policy: HighWaterMarkPolicy,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            min_ckpt: 0,
            step: 1,
            voc_iou_thresh: 0.5,
            conf_thresh: 0.01,
            nms_thresh: 0.45,
            top_k: 200,
            hwm_policy: HighWaterMarkPolicy::MaxOfAll,
        }
    }
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub net: NetConfig,
    pub eval: EvalConfig,
    pub profile: ProfileOptions,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file means all defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Range-check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.evaluation_logfile.trim().is_empty() {
            return Err(ConfigError::Validation(
                "paths.evaluation_logfile must not be empty".into(),
            ));
        }
        if self.net.image_size < 32 {
            return Err(ConfigError::Validation(
                "net.image_size must be >= 32".into(),
            ));
        }
        if self.net.base_width == 0 {
            return Err(ConfigError::Validation(
                "net.base_width must be > 0".into(),
            ));
        }
        if self.eval.step == 0 {
            return Err(ConfigError::Validation("eval.step must be >= 1".into()));
        }
        if self.eval.voc_iou_thresh <= 0.0 || self.eval.voc_iou_thresh > 1.0 {
            return Err(ConfigError::Validation(
                "eval.voc_iou_thresh must be in (0, 1]".into(),
            ));
        }
        if self.eval.conf_thresh < 0.0 || self.eval.conf_thresh >= 1.0 {
            return Err(ConfigError::Validation(
                "eval.conf_thresh must be in [0, 1)".into(),
            ));
        }
        if self.eval.nms_thresh <= 0.0 || self.eval.nms_thresh > 1.0 {
            return Err(ConfigError::Validation(
                "eval.nms_thresh must be in (0, 1]".into(),
            ));
        }
        if self.eval.top_k == 0 {
            return Err(ConfigError::Validation("eval.top_k must be > 0".into()));
        }
        if self.profile.max_depth == 0 {
            return Err(ConfigError::Validation(
                "profile.max_depth must be >= 1".into(),
            ));
        }
        if self.profile.select.is_empty() {
            return Err(ConfigError::Validation(
                "profile.select must name at least one metric".into(),
            ));
        }
        Ok(())
    }

    /// Checkpoint directory of `run_name`.
    pub fn run_dir(&self, run_name: &str) -> PathBuf {
        self.paths.ckpt_root.join(run_name)
    }

    /// Evaluation log path of `run_name`.
    pub fn evaluation_log_path(&self, run_name: &str) -> PathBuf {
        self.run_dir(run_name).join(&self.paths.evaluation_logfile)
    }

    /// Every setting at its default, as TOML.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}
