// ============================================================
// Layer 3 — Decoded Example
// ============================================================
// The unit that flows between the decoder and the batcher.
// Created once per record, moved (never cloned) into a batch.

use serde::{Deserialize, Serialize};

pub const IMAGE_HEIGHT: usize = 28;
pub const IMAGE_WIDTH:  usize = 28;
pub const IMAGE_PIXELS: usize = IMAGE_HEIGHT * IMAGE_WIDTH;
pub const NUM_CLASSES:  usize = 10;

/// One image scaled to [0, 1] plus its class id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedExample {
    /// Row-major 28x28 pixels, always IMAGE_PIXELS long
    pub feature_map: Vec<f32>,

    /// Class id as stored in the record. Not range checked.
    pub label: i32,
}
