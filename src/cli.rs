use std::path::PathBuf;

use clap::Parser;

use crate::checkpoint::HighWaterMarkPolicy;
use crate::config::AppConfig;
use crate::dataset::DatasetKind;
use crate::error::UsageError;
use crate::trunk::Trunk;

/// Evaluate detection/segmentation checkpoints on VOC or COCO.
#[derive(Parser, Debug, Clone)]
#[command(name = "det-eval", about = "Evaluate detection/segmentation checkpoints")]
pub struct RunArgs {
    /// Dataset to evaluate on
    #[arg(long, value_enum, default_value = "voc07")]
    pub dataset: DatasetKind,

    /// COCO split; ignored for VOC
    #[arg(long, default_value = "val2017")]
    pub split: String,

    /// Backbone the checkpoints were trained with
    #[arg(long, value_enum, default_value = "resnet50")]
    pub trunk: Trunk,

    /// Evaluate detection
    #[arg(long)]
    pub detect: bool,

    /// Evaluate segmentation
    #[arg(long)]
    pub segment: bool,

    /// Checkpoint index (thousands of steps) for a single evaluation
    #[arg(long, default_value_t = 0)]
    pub ckpt: u64,

    /// Evaluate every un-evaluated checkpoint of the run
    #[arg(long)]
    pub batch_eval: bool,

    /// Skip checkpoints below this index in batch mode
    #[arg(long)]
    pub min_ckpt: Option<u64>,

    /// Minimum index gap between checkpoints evaluated in batch mode
    #[arg(long)]
    pub step: Option<u64>,

    /// IoU threshold for VOC matching
    #[arg(long)]
    pub voc_iou_thresh: Option<f32>,

    /// Run directory name under the checkpoint root
    #[arg(long, default_value = "main")]
    pub run_name: String,

    /// Profile per-scope time and memory of the forward pass
    #[arg(long)]
    pub use_profile: bool,

    /// Segmentation ground truth is unavailable
    #[arg(long)]
    pub no_seg_gt: bool,

    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// How the evaluation log's high-water mark is read
    #[arg(long, value_enum)]
    pub hwm_policy: Option<HighWaterMarkPolicy>,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,
}

/// What a run evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Single(u64),
    Batch,
}

impl RunArgs {
    /// Reject flag combinations that cannot produce an evaluation.
    pub fn validate(&self) -> Result<(), UsageError> {
        if self.ckpt == 0 && !self.batch_eval {
            return Err(UsageError::NoCheckpoint);
        }
        if !self.detect && !self.segment {
            return Err(UsageError::NoTask);
        }
        Ok(())
    }

    /// Batch mode wins when both `--batch-eval` and `--ckpt` are given.
    pub fn mode(&self) -> RunMode {
        if self.batch_eval {
            RunMode::Batch
        } else {
            RunMode::Single(self.ckpt)
        }
    }

    /// Apply flags given on the command line on top of the file config.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(min_ckpt) = self.min_ckpt {
            config.eval.min_ckpt = min_ckpt;
        }
        if let Some(step) = self.step {
            config.eval.step = step;
        }
        if let Some(thresh) = self.voc_iou_thresh {
            config.eval.voc_iou_thresh = thresh;
        }
        if let Some(policy) = self.hwm_policy {
            config.eval.hwm_policy = policy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RunArgs {
        RunArgs::try_parse_from(std::iter::once("det-eval").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--detect", "--ckpt", "40"]);
        assert_eq!(args.dataset, DatasetKind::Voc07);
        assert_eq!(args.trunk, Trunk::Resnet50);
        assert_eq!(args.split, "val2017");
        assert_eq!(args.run_name, "main");
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert_eq!(args.mode(), RunMode::Single(40));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_value_enums() {
        let args = parse(&[
            "--dataset",
            "voc07+12",
            "--trunk",
            "vgg16",
            "--hwm-policy",
            "last-line",
            "--segment",
            "--batch-eval",
        ]);
        assert_eq!(args.dataset, DatasetKind::Voc07Plus12);
        assert_eq!(args.trunk, Trunk::Vgg16);
        assert_eq!(args.hwm_policy, Some(HighWaterMarkPolicy::LastLine));
        assert_eq!(args.mode(), RunMode::Batch);

        assert!(RunArgs::try_parse_from(["det-eval", "--dataset", "voc09"]).is_err());
    }

    #[test]
    fn test_validate() {
        assert_eq!(parse(&["--detect"]).validate(), Err(UsageError::NoCheckpoint));
        assert_eq!(parse(&["--ckpt", "3"]).validate(), Err(UsageError::NoTask));
        assert!(parse(&["--segment", "--batch-eval"]).validate().is_ok());
    }

    #[test]
    fn test_overrides_only_given_flags() {
        let mut config = AppConfig::default();
        config.eval.step = 7;
        parse(&[
            "--detect",
            "--batch-eval",
            "--min-ckpt",
            "10",
            "--voc-iou-thresh",
            "0.7",
        ])
        .apply_overrides(&mut config);
        assert_eq!(config.eval.min_ckpt, 10);
        assert_eq!(config.eval.step, 7);
        assert_eq!(config.eval.voc_iou_thresh, 0.7);
        assert_eq!(config.eval.hwm_policy, HighWaterMarkPolicy::MaxOfAll);
    }
}
