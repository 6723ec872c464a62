// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles the cross-cutting concerns that don't belong in any
// specific business layer:
//
//   checkpoint.rs — Saving and loading a finished trial
//                   Burn's CompactRecorder for the weights,
//                   JSON for the assignment, the TrainConfig
//                   and the export signature.
//
//   metrics.rs    — One CSV row per trial (step, train loss,
//                   eval loss, accuracy) in the output directory.
//
//   tuning.rs     — Description of the external hyperparameter
//                   search job, and the objective regex it uses
//                   to read our logs.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Per-trial metrics CSV logger
pub mod metrics;

/// Search job description and objective extraction
pub mod tuning;
