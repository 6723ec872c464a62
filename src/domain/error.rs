// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every error here is fatal for the current trial: nothing in
// this crate retries. The external search service decides what
// to do with a failed trial, so the only job of these types is
// to say precisely what went wrong.
//
// The application layer wraps all of them in anyhow::Error with
// extra context; the core layers keep them typed so tests can
// match on the exact variant.
//
// Reference: Rust Book §9 (Error Handling), thiserror docs

use std::io;

use thiserror::Error;

use crate::domain::mode::Mode;

/// Failure to turn one Raw Record payload into a DecodedExample.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not an Example with exactly the five expected fields.
    #[error("record does not match the image schema: {0}")]
    SchemaMismatch(String),

    /// `image_raw` holds the wrong number of samples.
    #[error("image_raw holds {actual} bytes, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// Failure while reading the length-prefixed record framing.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("stream ended inside a record")]
    Truncated,

    #[error("length checksum mismatch")]
    CorruptLength,

    #[error("data checksum mismatch for a {len}-byte record")]
    CorruptData { len: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Anything that can end an input pipeline early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open channel '{channel}' for pass {pass}: {source}")]
    Open {
        channel: String,
        pass:    usize,
        #[source]
        source:  io::Error,
    },

    #[error("pass {pass}: {source}")]
    Record {
        pass:   usize,
        #[source]
        source: RecordError,
    },

    #[error("pass {pass}: {source}")]
    Decode {
        pass:   usize,
        #[source]
        source: DecodeError,
    },
}

/// Model construction and mode dispatch failures.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown execution mode '{0}' (expected train, eval or predict)")]
    InvalidMode(String),

    #[error("mode {0} requires labels")]
    MissingLabels(Mode),

    #[error("network depth {depth} pools the 28x28 input down to an empty feature map")]
    EmptyFeatureMap { depth: usize },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// Invalid or unparsable hyperparameter values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("hyperparameter '{key}': {reason}")]
    InvalidHyperparameter { key: String, reason: String },

    #[error("hyperparameters are not a JSON object: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidHyperparameter { key: key.to_string(), reason: reason.into() }
    }
}
