//! # det_eval
//!
//! Offline evaluation of detection/segmentation checkpoints. Restores a
//! trained network, runs it over a VOC or COCO split and reports mAP and
//! mIoU. Batch mode walks a run's checkpoint directory, evaluates what has
//! not been evaluated yet and appends each result to the run's evaluation
//! log.
//!
//! ## Modules
//!
//! - [`checkpoint`]: Filename codec, evaluation log, batch selection and runner
//! - [`detector`]: Session, checkpoint restore, inference and post-processing
//! - [`eval`]: VOC and COCO evaluators, AP and mIoU computation
//! - [`dataset`]: Annotation parsing and VOC/COCO loaders
//! - [`net`]: ResNet/VGG trunks with detection and segmentation heads (Burn)
//! - [`trunk`]: Trunk name to architecture mapping
//! - [`profiler`]: Per-scope time and memory statistics
//! - [`cli`]: Command-line arguments
//! - [`config`]: TOML configuration loading and validation
//! - [`logging`]: Tracing subscriber setup
//! - [`error`]: Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod eval;
pub mod logging;
pub mod net;
pub mod profiler;
pub mod trunk;

/// Backend used for evaluation: CPU `NdArray` unless built with `wgpu`.
#[cfg(not(feature = "wgpu"))]
pub type EvalBackend = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
pub type EvalBackend = burn::backend::Wgpu<f32>;
