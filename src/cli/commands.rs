// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags.
//
// Paths fall back to the environment variables the managed
// platform sets for every training container:
//
//   SM_MODEL_DIR        → --model-dir
//   SM_CHANNEL_TRAIN    → --train-dir
//   SM_CHANNEL_EVAL     → --eval-dir
//   SM_OUTPUT_DATA_DIR  → --output-dir
//
// Hyperparameter flags are optional; when given they override
// whatever the platform's hyperparameters.json says.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{
    convert_use_case::ConvertConfig,
    evaluate_use_case::{EvaluateConfig, PredictConfig},
    train_use_case::{
        HyperparameterOverrides, InputMode, TrainConfig, DEFAULT_HYPERPARAMETERS_PATH,
    },
};
use crate::data::pipeline::PipelineConfig;
use crate::domain::hyperparameters::OptimizerKind;
use crate::ml::trainer::LoopSettings;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one training trial and save the model
    Train(TrainArgs),

    /// Evaluate a saved model on the eval channel
    Evaluate(EvaluateArgs),

    /// Print one JSON prediction per record of a TFRecord file
    Predict(PredictArgs),

    /// Convert MNIST IDX files into a TFRecord file
    Convert(ConvertArgs),

    /// Print the hyperparameter search job description as JSON
    TuningConfig(TuningConfigArgs),
}

/// Streaming pipeline flags shared by `train` and `evaluate`.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// File: channel directories hold .tfrecord files. Pipe: per-pass FIFOs.
    #[arg(long, default_value = "file")]
    pub input_mode: InputMode,

    /// Passes over each channel before its stream ends
    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    /// Examples per batch (the last batch of a pass may be smaller)
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Capacity of each bounded queue in the pipeline
    #[arg(long, default_value_t = 10)]
    pub prefetch: usize,

    /// Concurrent record decoders
    #[arg(long, default_value_t = 10)]
    pub decode_workers: usize,
}

impl From<&PipelineArgs> for PipelineConfig {
    fn from(a: &PipelineArgs) -> Self {
        PipelineConfig {
            epochs:         a.epochs,
            prefetch:       a.prefetch,
            decode_workers: a.decode_workers,
            batch_size:     a.batch_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Where the model, its config and signature are written
    #[arg(long, env = "SM_MODEL_DIR", default_value = "/opt/ml/model")]
    pub model_dir: String,

    /// Directory of the "train" channel
    #[arg(long, env = "SM_CHANNEL_TRAIN", default_value = "/opt/ml/input/data/train")]
    pub train_dir: String,

    /// Directory of the "eval" channel
    #[arg(long, env = "SM_CHANNEL_EVAL", default_value = "/opt/ml/input/data/eval")]
    pub eval_dir: String,

    /// Where metrics.csv is appended to
    #[arg(long, env = "SM_OUTPUT_DATA_DIR", default_value = "/opt/ml/output/data")]
    pub output_dir: String,

    /// Hyperparameter assignment written by the platform
    #[arg(long, default_value = DEFAULT_HYPERPARAMETERS_PATH)]
    pub hyperparameters: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Upper bound on training steps
    #[arg(long, default_value_t = 1000)]
    pub training_steps: usize,

    /// Upper bound on evaluation batches
    #[arg(long, default_value_t = 100)]
    pub evaluation_steps: usize,

    /// Log the objective every N steps
    #[arg(long, default_value_t = 100)]
    pub log_every_steps: usize,

    /// Adam step size (SGD always uses 0.001)
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Dropout probability during training, in [0, 1)
    #[arg(long)]
    pub dropout_rate: Option<f64>,

    /// Number of conv+pool stages
    #[arg(long)]
    pub nw_depth: Option<usize>,

    /// adam or sgd
    #[arg(long)]
    pub optimizer_type: Option<OptimizerKind>,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            model_dir:            a.model_dir,
            train_dir:            a.train_dir,
            eval_dir:             a.eval_dir,
            output_dir:           a.output_dir,
            input_mode:           a.pipeline.input_mode,
            hyperparameters_path: a.hyperparameters,
            overrides: HyperparameterOverrides {
                learning_rate:  a.learning_rate,
                dropout_rate:   a.dropout_rate,
                nw_depth:       a.nw_depth,
                optimizer_type: a.optimizer_type,
            },
            pipeline:      (&a.pipeline).into(),
            loop_settings: LoopSettings {
                training_steps:   a.training_steps,
                evaluation_steps: a.evaluation_steps,
                log_every_steps:  a.log_every_steps,
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long, env = "SM_MODEL_DIR", default_value = "/opt/ml/model")]
    pub model_dir: String,

    #[arg(long, env = "SM_CHANNEL_EVAL", default_value = "/opt/ml/input/data/eval")]
    pub eval_dir: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[arg(long, default_value_t = 100)]
    pub evaluation_steps: usize,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            model_dir:        a.model_dir,
            eval_dir:         a.eval_dir,
            input_mode:       a.pipeline.input_mode,
            pipeline:         (&a.pipeline).into(),
            evaluation_steps: a.evaluation_steps,
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// TFRecord file to predict on
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, env = "SM_MODEL_DIR", default_value = "/opt/ml/model")]
    pub model_dir: String,

    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,
}

impl From<PredictArgs> for PredictConfig {
    fn from(a: PredictArgs) -> Self {
        PredictConfig { model_dir: a.model_dir, input: a.input, batch_size: a.batch_size }
    }
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// IDX image file (magic 2051), uncompressed
    #[arg(long)]
    pub images: PathBuf,

    /// IDX label file (magic 2049), uncompressed
    #[arg(long)]
    pub labels: PathBuf,

    /// TFRecord file to write
    #[arg(long)]
    pub output: PathBuf,
}

impl From<ConvertArgs> for ConvertConfig {
    fn from(a: ConvertArgs) -> Self {
        ConvertConfig { images: a.images, labels: a.labels, output: a.output }
    }
}

#[derive(Args, Debug)]
pub struct TuningConfigArgs {
    /// Total trials the search may launch
    #[arg(long, default_value_t = 10)]
    pub max_jobs: usize,

    /// Trials running at the same time
    #[arg(long, default_value_t = 2)]
    pub max_parallel_jobs: usize,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_become_config() {
        let cli = Cli::try_parse_from([
            "mnist-tuner", "train",
            "--model-dir", "/tmp/model",
            "--train-dir", "/tmp/train",
            "--eval-dir", "/tmp/eval",
            "--output-dir", "/tmp/out",
            "--input-mode", "pipe",
            "--batch-size", "64",
            "--training-steps", "50",
            "--optimizer-type", "sgd",
            "--nw-depth", "3",
        ])
        .unwrap();

        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.model_dir, "/tmp/model");
        assert_eq!(cfg.input_mode, InputMode::Pipe);
        assert_eq!(cfg.pipeline.batch_size, 64);
        assert_eq!(cfg.pipeline.epochs, 20);
        assert_eq!(cfg.loop_settings.training_steps, 50);
        assert_eq!(cfg.overrides.optimizer_type, Some(OptimizerKind::Sgd));
        assert_eq!(cfg.overrides.nw_depth, Some(3));
        assert_eq!(cfg.overrides.learning_rate, None);
    }

    #[test]
    fn test_unknown_optimizer_is_rejected() {
        let result = Cli::try_parse_from(["mnist-tuner", "train", "--optimizer-type", "rmsprop"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tuning_config_defaults() {
        let cli = Cli::try_parse_from(["mnist-tuner", "tuning-config"]).unwrap();
        let Commands::TuningConfig(args) = cli.command else { panic!("expected tuning-config") };
        assert_eq!((args.max_jobs, args.max_parallel_jobs), (10, 2));
    }
}
