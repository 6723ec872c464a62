// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds a trained model from its model directory and serves
// it in the mode named by the saved export signature. Model
// directories written before signatures existed serve Predict.
use anyhow::{bail, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::batcher::MnistBatcher;
use crate::domain::hyperparameters::Hyperparameters;
use crate::domain::mode::Mode;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::dispatcher::{model_fn, ExportSignature, ModelSpec};
use crate::ml::model::{CnnConfig, CnnModel};
use crate::ml::{default_device, TrainBackend};

/// One answer per input image, printed as a JSON line by `predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class:         i64,
    pub probabilities: Vec<f32>,
}

pub struct Inferencer {
    model:  CnnModel<TrainBackend>,
    hp:     Hyperparameters,
    mode:   Mode,
    device: <TrainBackend as Backend>::Device,
}

impl Inferencer {
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        let device = default_device();
        let hp     = ckpt_manager.load_hyperparameters()?;
        let model  = CnnConfig::from_hyperparameters(&hp).init::<TrainBackend>(&device)?;
        let model  = ckpt_manager.load_model(model, &device)?;

        let signature = if ckpt_manager.has_signature() {
            ckpt_manager.load_signature()?
        } else {
            ExportSignature::default()
        };
        let mode: Mode = signature.method.parse()?;

        tracing::info!("Model loaded from checkpoint (depth {}, serving {})", model.depth(), mode);
        Ok(Self { model, hp, mode, device })
    }

    pub fn model(&self) -> &CnnModel<TrainBackend> {
        &self.model
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hp
    }

    /// features: one 784-long vector in [0, 1] per image.
    pub fn predict(&self, features: &[Vec<f32>]) -> Result<(Vec<Prediction>, ExportSignature)> {
        if features.is_empty() {
            return Ok((Vec::new(), ExportSignature::default()));
        }

        let images = MnistBatcher::<TrainBackend>::new(self.device.clone()).images(features);
        let spec = match model_fn(&self.model, images, None, self.mode, &self.hp)? {
            ModelSpec::Predict(spec) => spec,
            other => bail!("model_fn produced a {} spec in predict mode", other.mode()),
        };

        let classes = spec.classes.into_data().convert::<i64>().to_vec::<i64>()
            .map_err(|e| anyhow::anyhow!("Cannot read classes: {e:?}"))?;
        let probabilities = spec.probabilities.into_data().convert::<f32>().to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read probabilities: {e:?}"))?;

        let width = probabilities.len() / classes.len();
        let predictions = classes
            .into_iter()
            .zip(probabilities.chunks(width))
            .map(|(class, row)| Prediction { class, probabilities: row.to_vec() })
            .collect();

        Ok((predictions, spec.export))
    }
}
