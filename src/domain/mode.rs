// ============================================================
// Layer 3 — Execution Mode
// ============================================================
// One invocation of the model function runs in exactly one mode.
// The mode decides which result bundle is produced:
//
//   Train   → loss + one optimiser step
//   Eval    → loss + accuracy, no parameter updates
//   Predict → classes + probabilities + export signature
//
// Modes arriving as strings (the `method` of a saved export
// signature) go through FromStr; anything unrecognised is an
// InvalidMode error rather than a silent fallback.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Eval,
    Predict,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train   => "train",
            Mode::Eval    => "eval",
            Mode::Predict => "predict",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train"             => Ok(Mode::Train),
            "eval" | "evaluate" => Ok(Mode::Eval),
            // "infer" is the serving stack's name for prediction
            "predict" | "infer" => Ok(Mode::Predict),
            _ => Err(ModelError::InvalidMode(s.to_string())),
        }
    }
}
