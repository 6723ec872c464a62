// ============================================================
// Layer 5 — Depth-Parameterised CNN
// ============================================================
// The architecture is described twice on purpose: first as a
// flat list of immutable ConvLayerSpec records derived from the
// `nw_depth` hyperparameter, then as Burn modules built from
// that list. The list is cheap to inspect and test; the modules
// are what actually run.
//
//   input [N, 784] → reshape [N, 1, 28, 28]
//     │
//     ├─ stage i (i = 0..depth):
//     │     conv 5x5, 2^(5+i) kernels, same padding, ReLU
//     │     max-pool 2x2, stride 2
//     │
//     ├─ flatten
//     ├─ dense 1024 + ReLU
//     ├─ dropout (training only)
//     └─ dense 10 → logits
//
// Channel width doubles with every extra stage (32, 64, 128, …)
// while the spatial side halves (28, 14, 7, 3, 1). Depth 0 is a
// plain two-layer perceptron. Depth 5 pools the side to zero and
// is rejected; depths whose kernel count no longer fits in a
// machine word are reported as resource exhaustion.
//
// Reference: Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::error::ModelError;
use crate::domain::example::{IMAGE_HEIGHT, IMAGE_PIXELS, IMAGE_WIDTH, NUM_CLASSES};
use crate::domain::hyperparameters::Hyperparameters;

pub const KERNEL_SHAPE:   [usize; 2] = [5, 5];
pub const POOL_SHAPE:     [usize; 2] = [2, 2];
pub const POOL_STRIDE:    [usize; 2] = [2, 2];
pub const DENSE_UNITS:    usize      = 1024;
const BASE_KERNEL_EXPONENT: usize    = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Output keeps the input's spatial size
    Same,
}

/// One convolution stage, before any weights exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvLayerSpec {
    pub kernels:      usize,
    pub kernel_shape: [usize; 2],
    pub padding:      Padding,
}

/// Stage `i` gets 2^(5+i) kernels.
pub fn layer_specs(depth: usize) -> Result<Vec<ConvLayerSpec>, ModelError> {
    (0..depth)
        .map(|i| {
            let kernels = u32::try_from(BASE_KERNEL_EXPONENT + i)
                .ok()
                .and_then(|shift| 1usize.checked_shl(shift))
                .ok_or_else(|| {
                    ModelError::ResourceExhausted(format!(
                        "stage {i} of depth {depth} needs 2^{} kernels",
                        BASE_KERNEL_EXPONENT + i
                    ))
                })?;
            Ok(ConvLayerSpec { kernels, kernel_shape: KERNEL_SHAPE, padding: Padding::Same })
        })
        .collect()
}

/// Side length after a 2x2 stride-2 pool without padding.
fn pooled(side: usize) -> usize {
    if side < POOL_SHAPE[0] {
        0
    } else {
        (side - POOL_SHAPE[0]) / POOL_STRIDE[0] + 1
    }
}

#[derive(Config, Debug)]
pub struct CnnConfig {
    pub depth: usize,
    #[config(default = 0.8)]
    pub dropout: f64,
}

impl CnnConfig {
    pub fn from_hyperparameters(hp: &Hyperparameters) -> Self {
        Self::new(hp.nw_depth).with_dropout(hp.dropout_rate)
    }

    /// Width of the flattened feature map fed to the dense layer.
    pub fn flattened_size(&self, specs: &[ConvLayerSpec]) -> Result<usize, ModelError> {
        let Some(last) = specs.last() else {
            return Ok(IMAGE_PIXELS);
        };

        let mut height = IMAGE_HEIGHT;
        let mut width  = IMAGE_WIDTH;
        for _ in specs {
            height = pooled(height);
            width  = pooled(width);
        }
        if height == 0 || width == 0 {
            return Err(ModelError::EmptyFeatureMap { depth: self.depth });
        }

        last.kernels
            .checked_mul(height * width)
            .ok_or_else(|| ModelError::ResourceExhausted(format!(
                "flattened feature map of depth {} overflows", self.depth
            )))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CnnModel<B>, ModelError> {
        let specs     = layer_specs(self.depth)?;
        let flattened = self.flattened_size(&specs)?;
        flattened.checked_mul(DENSE_UNITS).ok_or_else(|| {
            ModelError::ResourceExhausted(format!("{flattened}x{DENSE_UNITS} dense weights"))
        })?;

        let mut channels_in = 1;
        let stages = specs
            .iter()
            .map(|spec| {
                let stage = ConvStage::new(spec, channels_in, device);
                channels_in = spec.kernels;
                stage
            })
            .collect();

        Ok(CnnModel {
            stages,
            dense:   LinearConfig::new(flattened, DENSE_UNITS).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            logits:  LinearConfig::new(DENSE_UNITS, NUM_CLASSES).init(device),
        })
    }
}

#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    pub conv: Conv2d<B>,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    fn new(spec: &ConvLayerSpec, channels_in: usize, device: &B::Device) -> Self {
        let padding = match spec.padding {
            Padding::Same => PaddingConfig2d::Same,
        };
        let conv = Conv2dConfig::new([channels_in, spec.kernels], spec.kernel_shape)
            .with_padding(padding)
            .init(device);
        let pool = MaxPool2dConfig::new(POOL_SHAPE).with_strides(POOL_STRIDE).init();
        Self { conv, pool }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(relu(self.conv.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct CnnModel<B: Backend> {
    pub stages:  Vec<ConvStage<B>>,
    pub dense:   Linear<B>,
    pub dropout: Dropout,
    pub logits:  Linear<B>,
}

impl<B: Backend> CnnModel<B> {
    /// images: [batch, 784] → dense features: [batch, 1024]
    pub fn features(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = images.dims();
        let mut x = images.reshape([batch, 1, IMAGE_HEIGHT, IMAGE_WIDTH]);
        for stage in &self.stages {
            x = stage.forward(x);
        }
        let x = x.flatten::<2>(1, 3);
        // Dropout is a no-op unless the backend tracks gradients.
        self.dropout.forward(relu(self.dense.forward(x)))
    }

    /// images: [batch, 784] → logits: [batch, 10]
    pub fn forward(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        self.logits.forward(self.features(images))
    }

    pub fn depth(&self) -> usize {
        self.stages.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_layer_specs_double_kernels() {
        let specs = layer_specs(6).unwrap();
        let kernels: Vec<usize> = specs.iter().map(|s| s.kernels).collect();
        assert_eq!(kernels, vec![32, 64, 128, 256, 512, 1024]);
        assert!(specs.iter().all(|s| s.kernel_shape == [5, 5] && s.padding == Padding::Same));
    }

    #[test]
    fn test_depth_zero_has_no_stages() {
        assert!(layer_specs(0).unwrap().is_empty());
        let model = CnnConfig::new(0).init::<TestBackend>(&Default::default()).unwrap();
        assert_eq!(model.depth(), 0);
        assert_eq!(model.dense.weight.val().dims(), [IMAGE_PIXELS, DENSE_UNITS]);
    }

    #[test]
    fn test_stage_count_and_kernel_counts_follow_depth() {
        let device = Default::default();
        for depth in 1..=4 {
            let model = CnnConfig::new(depth).init::<TestBackend>(&device).unwrap();
            assert_eq!(model.depth(), depth);

            let mut channels_in = 1;
            for (i, stage) in model.stages.iter().enumerate() {
                let kernels = 1usize << (5 + i);
                assert_eq!(stage.conv.weight.val().dims(), [kernels, channels_in, 5, 5]);
                channels_in = kernels;
            }
        }
    }

    #[test]
    fn test_flattened_sizes() {
        let cfg = CnnConfig::new(0);
        assert_eq!(cfg.flattened_size(&layer_specs(0).unwrap()).unwrap(), 784);
        for (depth, expected) in [(1, 32 * 14 * 14), (2, 64 * 7 * 7), (3, 128 * 3 * 3), (4, 256)] {
            let cfg = CnnConfig::new(depth);
            assert_eq!(cfg.flattened_size(&layer_specs(depth).unwrap()).unwrap(), expected);
        }
    }

    #[test]
    fn test_depth_five_collapses_feature_map() {
        let err = CnnConfig::new(5).init::<TestBackend>(&Default::default()).unwrap_err();
        assert!(matches!(err, ModelError::EmptyFeatureMap { depth: 5 }));
    }

    #[test]
    fn test_absurd_depth_is_resource_exhaustion() {
        assert!(matches!(layer_specs(64), Err(ModelError::ResourceExhausted(_))));
    }

    #[test]
    fn test_forward_produces_ten_logits() {
        let device = Default::default();
        let model  = CnnConfig::new(2).init::<TestBackend>(&device).unwrap();
        let images = Tensor::<TestBackend, 2>::ones([3, IMAGE_PIXELS], &device);
        assert_eq!(model.forward(images).dims(), [3, NUM_CLASSES]);
    }

    #[test]
    fn test_config_from_hyperparameters() {
        let hp  = Hyperparameters { nw_depth: 3, dropout_rate: 0.4, ..Hyperparameters::default() };
        let cfg = CnnConfig::from_hyperparameters(&hp);
        assert_eq!(cfg.depth, 3);
        assert_eq!(cfg.dropout, 0.4);
    }
}
