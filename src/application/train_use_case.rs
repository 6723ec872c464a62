// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Runs one trial of the hyperparameter search, in order:
//
//   Step 1: Resolve the hyperparameter assignment (file + flags)
//   Step 2: Save config and assignment        (Layer 6 - infra)
//   Step 3: Build the channel source + pipeline (Layer 4 - data)
//   Step 4: Build the CNN for nw_depth        (Layer 5 - ml)
//   Step 5: Train until the step budget or the data runs out
//   Step 6: Evaluate on the eval channel
//   Step 7: Save weights + export signature   (Layer 6 - infra)
//   Step 8: Append the metrics row            (Layer 6 - infra)
//
// Every trial is independent: nothing is read from or shared
// with other trials, so the search service can run many at once.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::data::{
    channel::{FileChannel, PipeChannel},
    pipeline::{InputPipeline, PipelineConfig},
};
use crate::domain::hyperparameters::{Hyperparameters, OptimizerKind};
use crate::domain::traits::{Channel, ChannelSource};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, TrialMetrics},
    tuning::{extract_objective, ParameterRanges},
};
use crate::ml::{
    default_device,
    dispatcher::{objective_line, EvalSpec, ExportSignature},
    model::CnnConfig,
    trainer::{evaluate, train, LoopSettings},
    TrainBackend,
};

pub const DEFAULT_HYPERPARAMETERS_PATH: &str = "/opt/ml/input/config/hyperparameters.json";

// ─── Input mode ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    File,
    Pipe,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::File => f.write_str("file"),
            InputMode::Pipe => f.write_str("pipe"),
        }
    }
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(InputMode::File),
            "pipe" => Ok(InputMode::Pipe),
            other  => Err(format!("unknown input mode '{other}', expected file or pipe")),
        }
    }
}

/// Resolve where each channel's records come from.
///
/// In pipe mode the platform puts the FIFOs next to the channel
/// directories, so the root is the parent of the first directory given.
pub fn channel_source(
    mode:      InputMode,
    train_dir: Option<&str>,
    eval_dir:  Option<&str>,
) -> Arc<dyn ChannelSource> {
    match mode {
        InputMode::File => {
            let mut source = FileChannel::new();
            if let Some(dir) = train_dir {
                source = source.with_dir(Channel::Train, dir);
            }
            if let Some(dir) = eval_dir {
                source = source.with_dir(Channel::Eval, dir);
            }
            Arc::new(source)
        }
        InputMode::Pipe => {
            let root = train_dir
                .or(eval_dir)
                .and_then(|dir| Path::new(dir).parent())
                .map(Path::to_path_buf)
                .unwrap_or_default();
            Arc::new(PipeChannel::new(root))
        }
    }
}

// ─── Hyperparameter overrides ─────────────────────────────────────────────────
/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterOverrides {
    pub learning_rate:  Option<f64>,
    pub dropout_rate:   Option<f64>,
    pub nw_depth:       Option<usize>,
    pub optimizer_type: Option<OptimizerKind>,
}

impl HyperparameterOverrides {
    pub fn apply(&self, mut hp: Hyperparameters) -> Hyperparameters {
        if let Some(v) = self.learning_rate  { hp.learning_rate  = v; }
        if let Some(v) = self.dropout_rate   { hp.dropout_rate   = v; }
        if let Some(v) = self.nw_depth       { hp.nw_depth       = v; }
        if let Some(v) = self.optimizer_type { hp.optimizer_type = v; }
        hp
    }
}

/// A missing file means "all defaults", as when the trainer runs outside the platform.
pub fn resolve_hyperparameters(
    path:      &Path,
    overrides: &HyperparameterOverrides,
) -> Result<Hyperparameters> {
    let from_file = if path.exists() {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Hyperparameters::from_json_str(&json)
            .with_context(|| format!("Invalid hyperparameters in '{}'", path.display()))?
    } else {
        tracing::info!("No hyperparameter file at '{}', using defaults", path.display());
        Hyperparameters::default()
    };

    let hp = overrides.apply(from_file);
    hp.validate()?;
    Ok(hp)
}

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything one trial needs apart from the data itself.
// Saved next to the model so a run can be reproduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub model_dir:            String,
    pub train_dir:            String,
    pub eval_dir:             String,
    pub output_dir:           String,
    pub input_mode:           InputMode,
    pub hyperparameters_path: String,
    pub overrides:            HyperparameterOverrides,
    pub pipeline:             PipelineConfig,
    pub loop_settings:        LoopSettings,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model_dir:            "/opt/ml/model".to_string(),
            train_dir:            "/opt/ml/input/data/train".to_string(),
            eval_dir:             "/opt/ml/input/data/eval".to_string(),
            output_dir:           "/opt/ml/output/data".to_string(),
            input_mode:           InputMode::File,
            hyperparameters_path: DEFAULT_HYPERPARAMETERS_PATH.to_string(),
            overrides:            HyperparameterOverrides::default(),
            pipeline:             PipelineConfig::default(),
            loop_settings:        LoopSettings::default(),
        }
    }
}

/// What a finished trial reports back to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub hyperparameters: Hyperparameters,
    pub steps:           usize,
    pub train_loss:      Option<f64>,
    /// The last training loss as the search service reads it off the log
    pub objective:       Option<f64>,
    pub eval:            EvalSpec,
    pub metrics_csv:     PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        let cfg = &self.config;

        // ── Step 1: Hyperparameters ──────────────────────────────────────────
        let hp = resolve_hyperparameters(Path::new(&cfg.hyperparameters_path), &cfg.overrides)?;
        tracing::info!(
            "Hyperparameters: learning_rate={}, dropout_rate={}, nw_depth={}, optimizer_type={}",
            hp.learning_rate, hp.dropout_rate, hp.nw_depth, hp.optimizer_type
        );
        let outside = ParameterRanges::default().out_of_range(&hp);
        if !outside.is_empty() {
            tracing::warn!("Outside the recommended search ranges: {}", outside.join(", "));
        }

        // ── Step 2: Save what the trial runs with ─────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.model_dir)?;
        ckpt_manager.save_config(cfg)?;
        ckpt_manager.save_hyperparameters(&hp)?;

        // ── Step 3: Input pipeline ────────────────────────────────────────────
        let source   = channel_source(cfg.input_mode, Some(&cfg.train_dir), Some(&cfg.eval_dir));
        let pipeline = InputPipeline::new(source, cfg.pipeline);
        tracing::info!(
            "Input mode {}: {} passes, batch size {}",
            cfg.input_mode, cfg.pipeline.epochs, cfg.pipeline.batch_size
        );

        // ── Step 4: Model ─────────────────────────────────────────────────────
        let device = default_device();
        let model  = CnnConfig::from_hyperparameters(&hp).init::<TrainBackend>(&device)?;

        // ── Step 5: Train ─────────────────────────────────────────────────────
        let outcome = train(model, &hp, &pipeline, &cfg.loop_settings, &device)?;

        // ── Step 6: Evaluate ──────────────────────────────────────────────────
        let eval = evaluate(&outcome.model, &hp, &pipeline, cfg.loop_settings.evaluation_steps, &device)?;

        // ── Step 7: Persist the model ─────────────────────────────────────────
        ckpt_manager.save_model(&outcome.model)?;
        ckpt_manager.save_signature(&ExportSignature::default())?;
        tracing::info!("Model saved to '{}'", ckpt_manager.dir().display());

        // ── Step 8: Metrics row ───────────────────────────────────────────────
        let metrics = MetricsLogger::new(&cfg.output_dir)?;
        metrics.log(&TrialMetrics::new(
            outcome.steps,
            outcome.last_loss.unwrap_or(f64::NAN),
            eval.loss,
            eval.accuracy,
        ))?;

        let objective = outcome
            .last_loss
            .and_then(|loss| extract_objective(&objective_line(loss, outcome.steps)));
        if outcome.last_loss.is_some() && objective.is_none() {
            tracing::warn!("Final loss is not readable by the search service");
        }

        Ok(TrainReport {
            hyperparameters: hp,
            steps:           outcome.steps,
            train_loss:      outcome.last_loss,
            objective,
            eval,
            metrics_csv:     metrics.csv_path().to_path_buf(),
        })
    }
}
