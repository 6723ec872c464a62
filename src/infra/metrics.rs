// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one row per finished trial to a CSV file in the
// output directory.
//
// The objective the search service sees is scraped from the log,
// not from this file. The CSV is for people: comparing trials,
// plotting, spotting a trial whose eval loss diverged from its
// training loss.
//
// Example CSV output:
//   step,train_loss,eval_loss,accuracy
//   1000,0.084312,0.097710,0.970703
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "step,train_loss,eval_loss,accuracy";

/// One row: the state of a trial after its last training step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialMetrics {
    /// Training steps actually taken
    pub step: usize,

    /// Loss of the last training batch
    pub train_loss: f64,

    /// Example-weighted mean loss over the eval batches
    pub eval_loss: f64,

    /// Fraction of eval examples classified correctly, in [0, 1]
    pub accuracy: f64,
}

impl TrialMetrics {
    pub fn new(step: usize, train_loss: f64, eval_loss: f64, accuracy: f64) -> Self {
        Self { step, train_loss, eval_loss, accuracy }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &TrialMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6}",
            m.step,
            m.train_loss,
            m.eval_loss,
            m.accuracy,
        )?;

        tracing::debug!(
            "Logged metrics at step {}: train_loss={:.4}, eval_loss={:.4}",
            m.step,
            m.train_loss,
            m.eval_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_append_under_one_header() {
        let dir = tempfile::tempdir().unwrap();

        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&TrialMetrics::new(10, 1.5, 1.25, 0.5)).unwrap();

        // A second logger on the same directory keeps the existing file.
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&TrialMetrics::new(20, 0.75, 0.5, 0.875)).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec![
            HEADER,
            "10,1.500000,1.250000,0.500000",
            "20,0.750000,0.500000,0.875000",
        ]);
    }
}
