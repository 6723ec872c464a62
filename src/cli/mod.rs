// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Commands:
//   1. `train`         — one trial: train, evaluate, save
//   2. `evaluate`      — loss and accuracy of a saved model
//   3. `predict`       — JSON lines of class + probabilities
//   4. `convert`       — MNIST IDX files → TFRecord
//   5. `tuning-config` — the search job the platform should run
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ConvertArgs, EvaluateArgs, PredictArgs, TrainArgs, TuningConfigArgs};

#[derive(Parser, Debug)]
#[command(
    name = "mnist-tuner",
    version,
    about = "Train a depth-parameterised MNIST CNN as one trial of a hyperparameter search."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. Only this layer prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)        => run_train(args),
            Commands::Evaluate(args)     => run_evaluate(args),
            Commands::Predict(args)      => run_predict(args),
            Commands::Convert(args)      => run_convert(args),
            Commands::TuningConfig(args) => run_tuning_config(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting trial with train channel '{}'", args.train_dir);
    let report = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Trial complete: {} steps, eval accuracy {:.4} over {} examples.",
        report.steps, report.eval.accuracy, report.eval.examples
    );
    if let Some(objective) = report.objective {
        println!("Objective seen by the search: {objective}");
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let spec = EvaluateUseCase::new(args.into()).execute()?;
    println!("{}", serde_json::to_string(&spec)?);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::evaluate_use_case::PredictUseCase;

    for prediction in PredictUseCase::new(args.into()).execute()? {
        println!("{}", serde_json::to_string(&prediction)?);
    }
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    use crate::application::convert_use_case::ConvertUseCase;

    let output  = args.output.clone();
    let written = ConvertUseCase::new(args.into()).execute()?;
    println!("Wrote {written} records to {}", output.display());
    Ok(())
}

fn run_tuning_config(args: TuningConfigArgs) -> Result<()> {
    use crate::infra::tuning::TuningJobConfig;

    let job = TuningJobConfig::new(args.max_jobs, args.max_parallel_jobs);
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
