// ============================================================
// Layer 3 — Hyperparameter Assignment
// ============================================================
// The external search service picks one assignment per trial
// and hands it to us as a flat JSON object. The managed platform
// stringifies every value, so "0.0005" and 0.0005 must both be
// accepted, and it adds its own bookkeeping keys which we ignore.
//
// Missing keys fall back to the documented defaults:
//
//   learning_rate  = 0.0001
//   dropout_rate   = 0.8
//   nw_depth       = 2
//   optimizer_type = adam
//
// The assignment is immutable once loaded and is passed by
// reference to the model builder and the mode dispatcher.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::ConfigError;

/// SGD always runs at this rate; the supplied learning_rate only drives Adam.
pub const SGD_LEARNING_RATE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Adam => f.write_str("adam"),
            OptimizerKind::Sgd  => f.write_str("sgd"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "sgd"  => Ok(OptimizerKind::Sgd),
            other  => Err(ConfigError::invalid(
                "optimizer_type",
                format!("'{other}' is not one of adam, sgd"),
            )),
        }
    }
}

/// The optimiser a trial actually runs with, after the selection policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSettings {
    pub kind:          OptimizerKind,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub learning_rate:  f64,
    pub dropout_rate:   f64,
    /// Number of conv+pool stages. Deliberately not range checked.
    pub nw_depth:       usize,
    pub optimizer_type: OptimizerKind,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate:  0.0001,
            dropout_rate:   0.8,
            nw_depth:       2,
            optimizer_type: OptimizerKind::Adam,
        }
    }
}

impl Hyperparameters {
    /// Parse a platform-style hyperparameter object.
    /// Absent keys keep their defaults, unknown keys are skipped.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        let mut hp = Self::default();

        if let Some(v) = map.get("learning_rate") {
            hp.learning_rate = parse_f64("learning_rate", v)?;
        }
        if let Some(v) = map.get("dropout_rate") {
            hp.dropout_rate = parse_f64("dropout_rate", v)?;
        }
        if let Some(v) = map.get("nw_depth") {
            hp.nw_depth = parse_usize("nw_depth", v)?;
        }
        if let Some(v) = map.get("optimizer_type") {
            hp.optimizer_type = match v {
                Value::String(s) => s.parse()?,
                other => return Err(ConfigError::invalid(
                    "optimizer_type",
                    format!("expected a string, got {other}"),
                )),
            };
        }

        hp.validate()?;
        Ok(hp)
    }

    /// Checks the values the model cannot run with at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::invalid(
                "learning_rate",
                format!("{} is not a positive finite number", self.learning_rate),
            ));
        }
        // A rate of 1.0 zeroes every activation and divides by zero when rescaling.
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ConfigError::invalid(
                "dropout_rate",
                format!("{} is outside [0, 1)", self.dropout_rate),
            ));
        }
        Ok(())
    }

    /// Adam runs at the assigned rate; SGD ignores it and uses SGD_LEARNING_RATE.
    pub fn optimizer_settings(&self) -> OptimizerSettings {
        let learning_rate = match self.optimizer_type {
            OptimizerKind::Adam => self.learning_rate,
            OptimizerKind::Sgd  => SGD_LEARNING_RATE,
        };
        OptimizerSettings { kind: self.optimizer_type, learning_rate }
    }
}

fn parse_f64(key: &str, value: &Value) -> Result<f64, ConfigError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ConfigError::invalid(key, format!("{n} is not representable"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| ConfigError::invalid(key, format!("'{s}': {e}"))),
        other => Err(ConfigError::invalid(key, format!("expected a number, got {other}"))),
    }
}

fn parse_usize(key: &str, value: &Value) -> Result<usize, ConfigError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| ConfigError::invalid(key, format!("{n} is not a non-negative integer"))),
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::invalid(key, format!("'{s}': {e}"))),
        other => Err(ConfigError::invalid(key, format!("expected an integer, got {other}"))),
    }
}
