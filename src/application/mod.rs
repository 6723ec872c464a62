// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one workflow (a training trial, an evaluation, a prediction
// run, a dataset conversion).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// One trial: train, evaluate, save
pub mod train_use_case;

// Evaluate or predict with a saved model
pub mod evaluate_use_case;

// MNIST IDX files → TFRecord
pub mod convert_use_case;
