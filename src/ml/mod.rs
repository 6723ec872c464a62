// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code apart
// from the tensor batcher in data/.
//
// What's in this layer:
//
//   model.rs      — Layer descriptors and the depth-parameterised
//                   CNN built from them:
//                   • conv 5x5 + ReLU + max-pool per stage
//                   • dense 1024 + ReLU
//                   • dropout (training only)
//                   • 10 logits
//
//   dispatcher.rs — model_fn: one forward pass turned into the
//                   Predict / Train / Eval contract, plus the
//                   objective log line
//
//   trainer.rs    — The step-budgeted training loop and the
//                   evaluation loop that follows it
//
//   inferencer.rs — Loads a saved model and answers predictions
//
// Backends:
//   CPU (NdArray) by default; build with `--features wgpu` to
//   run on the GPU. Training always wraps the backend in
//   Autodiff; Eval and Predict strip it again via `valid()`.
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Layer descriptors and the CNN
pub mod model;

/// Mode dispatch and the objective log line
pub mod dispatcher;

/// Training and evaluation loops
pub mod trainer;

/// Inference from a saved model
pub mod inferencer;

use burn::backend::Autodiff;

#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InnerBackend = burn::backend::Wgpu;

pub type TrainBackend = Autodiff<InnerBackend>;

pub fn default_device() -> <TrainBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}
