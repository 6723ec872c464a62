// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores a finished trial using Burn's CompactRecorder.
//
// Only the final model of a trial is kept: the search service
// compares trials, not epochs, so there is no per-epoch history.
//
// What gets written to the model directory:
//   model.mpk.gz           ← all learned parameters
//   hyperparameters.json   ← the assignment the trial ran with
//   train_config.json      ← paths, pipeline and loop settings
//   signature.json         ← export signature for serving
//
// Why save the hyperparameters separately?
//   The architecture depends on nw_depth (and dropout_rate is
//   part of the config), so the model must be rebuilt from the
//   same assignment before the weights can be loaded into it.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::domain::hyperparameters::Hyperparameters;
use crate::ml::dispatcher::ExportSignature;
use crate::ml::model::CnnModel;

const MODEL_FILE:           &str = "model";
const HYPERPARAMETERS_FILE: &str = "hyperparameters.json";
const CONFIG_FILE:          &str = "train_config.json";
const SIGNATURE_FILE:       &str = "signature.json";

/// Manages the files of one model directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create model directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The recorder appends its own extension to the path.
    pub fn save_model<B: Backend>(&self, model: &CnnModel<B>) -> Result<()> {
        let path = self.dir.join(MODEL_FILE);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;

        tracing::debug!("Saved model weights to '{}'", path.display());
        Ok(())
    }

    /// `model` must already have the saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  CnnModel<B>,
        device: &B::Device,
    ) -> Result<CnnModel<B>> {
        let path = self.dir.join(MODEL_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load model '{}'. Have you trained the model first?",
                    path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_hyperparameters(&self, hp: &Hyperparameters) -> Result<()> {
        self.write_json(HYPERPARAMETERS_FILE, hp)
    }

    pub fn load_hyperparameters(&self) -> Result<Hyperparameters> {
        let hp: Hyperparameters = self.read_json(HYPERPARAMETERS_FILE)?;
        hp.validate()?;
        Ok(hp)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    pub fn save_signature(&self, signature: &ExportSignature) -> Result<()> {
        self.write_json(SIGNATURE_FILE, signature)
    }

    pub fn load_signature(&self) -> Result<ExportSignature> {
        self.read_json(SIGNATURE_FILE)
    }

    pub fn has_signature(&self) -> bool {
        self.dir.join(SIGNATURE_FILE).exists()
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read '{}'. Make sure you have run 'train' first.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed JSON in '{}'", path.display()))
    }
}
