#![recursion_limit = "256"]

use anyhow::{Context, Result};
use clap::Parser;

use det_eval::checkpoint::{
    run_batch, BatchOutcome, BatchPlan, CheckpointManager, EvalLog, SelectionWindow,
};
use det_eval::cli::{RunArgs, RunMode};
use det_eval::config::AppConfig;
use det_eval::dataset::{DatasetKind, LoaderSpec};
use det_eval::detector::{DecodeParams, Detector, DetectorOptions, EvalSession};
use det_eval::eval::{CocoEval, EvalPipeline, Evaluation, Evaluator};
use det_eval::logging::{LoggingContext, LoggingOptions};
use det_eval::net::DetectionNetConfig;
use det_eval::profiler::Profiler;
use det_eval::EvalBackend;

/// Per-run log file, next to the checkpoints.
const RUN_LOG_FILE: &str = "eval.log";

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = RunArgs::parse();
    args.validate()?;

    let config_found = args.config.exists();
    let mut config = AppConfig::load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    args.apply_overrides(&mut config);
    config.validate().context("validating command-line overrides")?;

    // Only log into the run directory when it already exists, so a mistyped
    // run name still fails as a missing checkpoint directory.
    let run_dir = config.run_dir(&args.run_name);
    let logging = LoggingContext::init(&LoggingOptions {
        verbose: args.verbose,
        log_file: run_dir.is_dir().then(|| run_dir.join(RUN_LOG_FILE)),
    })?;
    if !config_found {
        tracing::warn!("Config file {} not found, using defaults", args.config.display());
    }

    let result = evaluate(&args, &config);
    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    logging.shutdown();
    result
}

fn evaluate(args: &RunArgs, config: &AppConfig) -> Result<()> {
    let (family, depth) = args.trunk.spec();
    let loader = LoaderSpec::select(args.dataset, &args.split, args.segment)
        .open(&config.paths.dataset_root)
        .context("opening dataset")?;

    let session = EvalSession::<EvalBackend>::new(Default::default());
    tracing::info!(
        trunk = %args.trunk,
        ?family,
        depth,
        classes = loader.num_classes(),
        "Building network"
    );
    let network =
        DetectionNetConfig::new(&config.net, args.trunk, loader.num_classes(), args.segment)
            .init(session.device());

    let options = DetectorOptions {
        image_size: config.net.image_size,
        detect: args.detect,
        segment: args.segment,
        no_gt: args.no_seg_gt,
        decode: DecodeParams {
            conf_thresh: config.eval.conf_thresh,
            nms_thresh: config.eval.nms_thresh,
            top_k: config.eval.top_k,
        },
    };
    let checkpoints = CheckpointManager::for_run(&config.paths.ckpt_root, &args.run_name);
    let detector = Detector::new(
        session,
        network,
        loader.clone(),
        checkpoints.clone(),
        options,
        args.use_profile.then(Profiler::new),
    );
    let evaluator: Box<dyn Evaluator<EvalBackend>> = match args.dataset {
        DatasetKind::Coco => Box::new(CocoEval::new(loader)),
        _ => Box::new(Evaluation::new(loader, config.eval.voc_iou_thresh)),
    };
    let mut pipeline = EvalPipeline::new(detector, evaluator);

    match args.mode() {
        RunMode::Single(ckpt) => {
            let report = pipeline
                .evaluate_single(ckpt)
                .with_context(|| format!("evaluating checkpoint {ckpt}"))?;
            tracing::info!("{}", report.trim_end());
            print!("{report}");
        }
        RunMode::Batch => {
            tracing::info!("Evaluating {}", args.run_name);
            let plan = BatchPlan {
                checkpoints,
                log: EvalLog::new(config.evaluation_log_path(&args.run_name)),
                window: SelectionWindow::new(config.eval.min_ckpt, config.eval.step),
                policy: config.eval.hwm_policy,
            };
            match run_batch(&plan, &mut pipeline)? {
                BatchOutcome::Evaluated(done) => tracing::info!(
                    count = done.len(),
                    log = %plan.log.path().display(),
                    "Batch evaluation finished"
                ),
                BatchOutcome::NothingToEvaluate { .. } => {}
            }
        }
    }

    if let Some(profiler) = pipeline.detector().profiler() {
        print!("{}", profiler.profile_name_scope(&config.profile));
    }
    Ok(())
}
