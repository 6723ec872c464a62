// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define what the
// trainer works with. Nothing in here touches Burn, files or
// threads — those live in the data, ml and infra layers.
//
//   hyperparameters.rs — one trial's assignment + its defaults
//   mode.rs            — TRAIN / EVAL / PREDICT selector
//   example.rs         — decoded image/label pair and MNIST shape constants
//   error.rs           — typed errors for every fatal path
//   traits.rs          — logical channel names and the source abstraction
//
// Reference: Rust Book §5 (Structs), §6 (Enums), §10 (Traits)

/// Hyperparameter assignment supplied once per trial
pub mod hyperparameters;

/// Execution mode of one model invocation
pub mod mode;

/// One decoded training example
pub mod example;

/// Error taxonomy shared by all layers
pub mod error;

/// Channel names and the record source abstraction
pub mod traits;
