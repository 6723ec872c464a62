// ============================================================
// Layer 2 — Convert Use Case
// ============================================================
// Turns the MNIST IDX distribution files into a TFRecord file
// the channels can stream:
//
//   Step 1: Read the image and label files (Layer 4 - data/idx)
//   Step 2: Check both describe the same number of 28x28 images
//   Step 3: Encode each pair with the five-field schema
//   Step 4: Frame and write every record (Layer 4 - data/tfrecord)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};

use crate::data::{idx, record::encode_example, tfrecord::TfRecordWriter};
use crate::domain::example::{IMAGE_HEIGHT, IMAGE_WIDTH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    pub images: PathBuf,
    pub labels: PathBuf,
    pub output: PathBuf,
}

pub struct ConvertUseCase {
    config: ConvertConfig,
}

impl ConvertUseCase {
    pub fn new(config: ConvertConfig) -> Self {
        Self { config }
    }

    /// Returns the number of records written.
    pub fn execute(&self) -> Result<usize> {
        let cfg = &self.config;

        // ── Step 1: Read ──────────────────────────────────────────────────────
        let images = idx::load_images(&cfg.images)?;
        let labels = idx::load_labels(&cfg.labels)?;

        // ── Step 2: Check ─────────────────────────────────────────────────────
        if images.images.len() != labels.len() {
            bail!(
                "'{}' holds {} images but '{}' holds {} labels",
                cfg.images.display(), images.images.len(),
                cfg.labels.display(), labels.len()
            );
        }
        if (images.rows, images.cols) != (IMAGE_HEIGHT, IMAGE_WIDTH) {
            bail!(
                "images are {}x{}, expected {IMAGE_HEIGHT}x{IMAGE_WIDTH}",
                images.rows, images.cols
            );
        }

        // ── Steps 3 + 4: Encode and write ─────────────────────────────────────
        if let Some(parent) = cfg.output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        let file = File::create(&cfg.output)
            .with_context(|| format!("Cannot create '{}'", cfg.output.display()))?;
        let mut writer = TfRecordWriter::new(BufWriter::new(file));

        for (pixels, &label) in images.images.iter().zip(&labels) {
            let payload = encode_example(
                pixels,
                i64::from(label),
                images.rows as i64,
                images.cols as i64,
                1,
            );
            writer.write_record(&payload)?;
        }
        writer.into_inner()?;

        tracing::info!("Wrote {} records to '{}'", labels.len(), cfg.output.display());
        Ok(labels.len())
    }
}
