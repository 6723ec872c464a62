// ============================================================
// Layer 6 — Search Job Description
// ============================================================
// The hyperparameter search itself runs in an external service.
// This module only describes the job that service should run and
// proves that what the trainer logs is something it can scrape.
//
// The service learns each trial's objective by applying
//
//   loss = ([0-9\.]+)
//
// to the trial's log and taking the last capture. extract_objective
// applies the same regex the same way.
//
// Recommended search space:
//
//   learning_rate   continuous  [0.0001, 0.001]
//   dropout_rate    continuous  [0.3, 1.0]
//   nw_depth        integer     [1, 4]
//   optimizer_type  categorical {sgd, adam}

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::hyperparameters::{Hyperparameters, OptimizerKind};

pub const OBJECTIVE_METRIC: &str = "loss";
pub const OBJECTIVE_REGEX:  &str = r"loss = ([0-9\.]+)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveType {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name:  String,
    pub regex: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContinuousRange {
    pub min: f64,
    pub max: f64,
}

impl ContinuousRange {
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerRange {
    pub min: usize,
    pub max: usize,
}

impl IntegerRange {
    pub fn contains(&self, value: usize) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub learning_rate:  ContinuousRange,
    pub dropout_rate:   ContinuousRange,
    pub nw_depth:       IntegerRange,
    pub optimizer_type: Vec<OptimizerKind>,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            learning_rate:  ContinuousRange { min: 0.0001, max: 0.001 },
            dropout_rate:   ContinuousRange { min: 0.3, max: 1.0 },
            nw_depth:       IntegerRange { min: 1, max: 4 },
            optimizer_type: vec![OptimizerKind::Sgd, OptimizerKind::Adam],
        }
    }
}

impl ParameterRanges {
    /// Keys of `hp` whose value lies outside the search space.
    pub fn out_of_range(&self, hp: &Hyperparameters) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if !self.learning_rate.contains(hp.learning_rate) {
            keys.push("learning_rate");
        }
        if !self.dropout_rate.contains(hp.dropout_rate) {
            keys.push("dropout_rate");
        }
        if !self.nw_depth.contains(hp.nw_depth) {
            keys.push("nw_depth");
        }
        if !self.optimizer_type.contains(&hp.optimizer_type) {
            keys.push("optimizer_type");
        }
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningJobConfig {
    pub objective_metric_name: String,
    pub objective_type:        ObjectiveType,
    pub max_jobs:              usize,
    pub max_parallel_jobs:     usize,
    pub metric_definitions:    Vec<MetricDefinition>,
    pub hyperparameter_ranges: ParameterRanges,
}

impl TuningJobConfig {
    pub fn new(max_jobs: usize, max_parallel_jobs: usize) -> Self {
        Self {
            objective_metric_name: OBJECTIVE_METRIC.to_string(),
            objective_type:        ObjectiveType::Minimize,
            max_jobs,
            max_parallel_jobs,
            metric_definitions: vec![MetricDefinition {
                name:  OBJECTIVE_METRIC.to_string(),
                regex: OBJECTIVE_REGEX.to_string(),
            }],
            hyperparameter_ranges: ParameterRanges::default(),
        }
    }
}

impl Default for TuningJobConfig {
    fn default() -> Self {
        Self::new(10, 2)
    }
}

fn objective_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OBJECTIVE_REGEX).ok()).as_ref()
}

/// Last objective value in `log`, as the search service would read it.
pub fn extract_objective(log: &str) -> Option<f64> {
    objective_regex()?
        .captures_iter(log)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .last()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::dispatcher::objective_line;

    #[test]
    fn test_extract_takes_last_value() {
        let log = format!(
            "INFO starting\n{}\n{}\nINFO eval: accuracy = 0.970000, mean_cross_entropy = 0.100000, examples = 10000\n",
            objective_line(2.302585, 1),
            objective_line(0.084312, 1000),
        );
        assert_eq!(extract_objective(&log), Some(0.084312));
    }

    #[test]
    fn test_tiny_loss_stays_harvestable() {
        // Scientific notation would not match the regex.
        let line = objective_line(1.5e-7, 7);
        assert!(!line.contains("e-"));
        assert_eq!(extract_objective(&line), Some(0.0));
    }

    #[test]
    fn test_no_objective_in_log() {
        assert_eq!(extract_objective("nothing to see"), None);
    }

    #[test]
    fn test_default_job_describes_the_search() {
        let job = TuningJobConfig::default();
        assert_eq!(job.objective_metric_name, "loss");
        assert_eq!(job.objective_type, ObjectiveType::Minimize);
        assert_eq!(job.metric_definitions[0].regex, r"loss = ([0-9\.]+)");

        let json: serde_json::Value = serde_json::to_value(&job).unwrap();
        assert_eq!(json["hyperparameter_ranges"]["nw_depth"]["max"], 4);
        assert_eq!(json["hyperparameter_ranges"]["optimizer_type"][0], "sgd");
    }

    #[test]
    fn test_out_of_range_names_offending_keys() {
        let ranges = ParameterRanges::default();
        let inside = Hyperparameters {
            learning_rate:  0.0005,
            dropout_rate:   0.5,
            nw_depth:       3,
            optimizer_type: OptimizerKind::Adam,
        };
        assert!(ranges.out_of_range(&inside).is_empty());

        // Default learning rate sits on the lower edge.
        assert!(ranges.out_of_range(&Hyperparameters::default()).is_empty());

        let too_deep = Hyperparameters { nw_depth: 5, ..inside.clone() };
        assert_eq!(ranges.out_of_range(&too_deep), vec!["nw_depth"]);
        let off_grid = Hyperparameters { learning_rate: 0.01, dropout_rate: 0.1, ..inside };
        assert_eq!(ranges.out_of_range(&off_grid), vec!["learning_rate", "dropout_rate"]);
    }
}
