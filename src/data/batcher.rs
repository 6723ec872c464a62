// ============================================================
// Layer 4 — MNIST Batcher
// ============================================================
// Implements Burn's Batcher trait to turn the decoded examples
// of one pipeline Batch into tensors on the target device.
//
// How batching works here:
//   Input:  Vec of N DecodedExamples, each 784 floats + 1 label
//   Output: MnistBatch { images: [N, 784] f32, labels: [N] int }
//
// Every feature_map is already exactly 784 long (the decoder
// guarantees it), so we flatten into one Vec and reshape.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::example::{DecodedExample, IMAGE_PIXELS};

/// A batch of images ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct MnistBatch<B: Backend> {
    /// Flattened images — shape: [batch_size, 784], values in [0, 1]
    pub images: Tensor<B, 2>,

    /// Class ids — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct MnistBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack raw feature vectors without labels (prediction input).
    pub fn images(&self, features: &[Vec<f32>]) -> Tensor<B, 2> {
        let flat: Vec<f32> = features.iter().flat_map(|f| f.iter().copied()).collect();
        Tensor::<B, 2>::from_data(TensorData::new(flat, [features.len(), IMAGE_PIXELS]), &self.device)
    }
}

impl<B: Backend> Batcher<DecodedExample, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<DecodedExample>) -> MnistBatch<B> {
        let batch_size = items.len();

        let flat: Vec<f32> = items
            .iter()
            .flat_map(|e| e.feature_map.iter().copied())
            .collect();
        let labels: Vec<i64> = items.iter().map(|e| i64::from(e.label)).collect();

        let images = Tensor::<B, 2>::from_data(
            TensorData::new(flat, [batch_size, IMAGE_PIXELS]),
            &self.device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [batch_size]),
            &self.device,
        );

        MnistBatch { images, labels }
    }
}
