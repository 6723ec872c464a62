// ============================================================
// Layer 2 — Evaluate / Predict Use Cases
// ============================================================
// Both start from a model directory written by `train`:
//
//   evaluate → streams a channel through the pipeline and runs
//              model_fn in Eval mode (loss + accuracy)
//   predict  → decodes every record of one TFRecord file and
//              runs model_fn in Predict mode (class + softmax)
//
// Labels in the predict input are decoded but never consulted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::PathBuf};

use crate::application::train_use_case::{channel_source, InputMode};
use crate::data::{
    pipeline::{InputPipeline, PipelineConfig},
    record,
    tfrecord::TfRecordReader,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    default_device,
    dispatcher::EvalSpec,
    inferencer::{Inferencer, Prediction},
    trainer::evaluate,
};

// ─── Evaluate ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateConfig {
    pub model_dir:        String,
    pub eval_dir:         String,
    pub input_mode:       InputMode,
    pub pipeline:         PipelineConfig,
    pub evaluation_steps: usize,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvalSpec> {
        let cfg        = &self.config;
        let ckpt       = CheckpointManager::new(&cfg.model_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt)?;

        let source   = channel_source(cfg.input_mode, None, Some(&cfg.eval_dir));
        let pipeline = InputPipeline::new(source, cfg.pipeline);

        evaluate(
            inferencer.model(),
            inferencer.hyperparameters(),
            &pipeline,
            cfg.evaluation_steps,
            &default_device(),
        )
    }
}

// ─── Predict ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictConfig {
    pub model_dir:  String,
    pub input:      PathBuf,
    pub batch_size: usize,
}

pub struct PredictUseCase {
    config: PredictConfig,
}

impl PredictUseCase {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    /// One prediction per record, in file order.
    pub fn execute(&self) -> Result<Vec<Prediction>> {
        let cfg        = &self.config;
        let ckpt       = CheckpointManager::new(&cfg.model_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt)?;

        let file = File::open(&cfg.input)
            .with_context(|| format!("Cannot open '{}'", cfg.input.display()))?;
        let reader = TfRecordReader::new(BufReader::new(file));

        let batch_size      = cfg.batch_size.max(1);
        let mut predictions = Vec::new();
        let mut pending     = Vec::with_capacity(batch_size);

        for (index, raw) in reader.enumerate() {
            let raw = raw.with_context(|| format!("Record {index} of '{}'", cfg.input.display()))?;
            let example = record::decode(&raw)
                .with_context(|| format!("Record {index} of '{}'", cfg.input.display()))?;
            pending.push(example.feature_map);

            if pending.len() == batch_size {
                let (batch, _) = inferencer.predict(&pending)?;
                predictions.extend(batch);
                pending.clear();
            }
        }
        if !pending.is_empty() {
            let (batch, _) = inferencer.predict(&pending)?;
            predictions.extend(batch);
        }

        tracing::info!("Predicted {} examples", predictions.len());
        Ok(predictions)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::data::{record::encode_example, tfrecord::TfRecordWriter};
    use crate::domain::example::IMAGE_PIXELS;
    use crate::domain::hyperparameters::Hyperparameters;
    use crate::ml::{model::CnnConfig, TrainBackend};

    fn saved_model(dir: &std::path::Path) {
        let ckpt = CheckpointManager::new(dir).unwrap();
        let hp   = Hyperparameters { nw_depth: 0, ..Hyperparameters::default() };
        let model = CnnConfig::from_hyperparameters(&hp)
            .init::<TrainBackend>(&default_device())
            .unwrap();
        ckpt.save_model(&model).unwrap();
        ckpt.save_hyperparameters(&hp).unwrap();
    }

    fn record_file(path: &std::path::Path, count: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = TfRecordWriter::new(File::create(path).unwrap());
        for i in 0..count {
            writer
                .write_record(&encode_example(&[i as u8; IMAGE_PIXELS], (i % 10) as i64, 28, 28, 1))
                .unwrap();
        }
        writer.into_inner().unwrap();
    }

    #[test]
    fn test_predict_every_record_in_order_of_file() {
        let dir = tempfile::tempdir().unwrap();
        saved_model(&dir.path().join("model"));
        let input = dir.path().join("data").join("test.tfrecord");
        record_file(&input, 5);

        let predictions = PredictUseCase::new(PredictConfig {
            model_dir:  dir.path().join("model").display().to_string(),
            input,
            batch_size: 2,
        })
        .execute()
        .unwrap();

        assert_eq!(predictions.len(), 5);
        assert!(predictions.iter().all(|p| p.probabilities.len() == 10));
    }

    #[test]
    fn test_evaluate_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        saved_model(&dir.path().join("model"));
        record_file(&dir.path().join("eval").join("part-0.tfrecord"), 7);

        let spec = EvaluateUseCase::new(EvaluateConfig {
            model_dir:        dir.path().join("model").display().to_string(),
            eval_dir:         dir.path().join("eval").display().to_string(),
            input_mode:       InputMode::File,
            pipeline:         PipelineConfig { epochs: 1, batch_size: 3, ..PipelineConfig::default() },
            evaluation_steps: 100,
        })
        .execute()
        .unwrap();

        assert_eq!(spec.examples, 7);
        assert!(spec.loss.is_finite());
    }

    #[test]
    fn test_predict_rejects_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        saved_model(&dir.path().join("model"));
        let input = dir.path().join("bad.tfrecord");
        let mut writer = TfRecordWriter::new(File::create(&input).unwrap());
        writer.write_record(&encode_example(&[0u8; 100], 1, 10, 10, 1)).unwrap();
        writer.into_inner().unwrap();

        let result = PredictUseCase::new(PredictConfig {
            model_dir:  dir.path().join("model").display().to_string(),
            input,
            batch_size: 8,
        })
        .execute();
        assert!(result.is_err());
    }
}
