// ============================================================
// Layer 5 — Mode Dispatcher
// ============================================================
// The model function maps
//
//   (features, labels, mode, hyperparameters) → ModelSpec
//
// where ModelSpec carries only what its mode needs:
//
//   Predict → classes (argmax), probabilities (softmax), export signature
//   Train   → scalar loss, gradients, chosen optimiser settings
//   Eval    → scalar loss, accuracy, example count
//
// Train runs the network on the autodiff backend with dropout
// live. Eval and Predict run `model.valid()` on the inner backend,
// so dropout is a pass-through and no graph is recorded.
//
// The only channel the external search service has into a trial
// is the log. The objective line is written by log_objective in
// a fixed-point form that the service's regex
//
//   loss = ([0-9\.]+)
//
// can always capture.
//
// Reference: Burn Book §5 (Training), TensorFlow EstimatorSpec

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};
use serde::{Deserialize, Serialize};

use crate::domain::error::ModelError;
use crate::domain::example::{IMAGE_PIXELS, NUM_CLASSES};
use crate::domain::hyperparameters::{Hyperparameters, OptimizerSettings};
use crate::domain::mode::Mode;
use crate::ml::model::CnnModel;

pub const PREDICTIONS_KEY: &str = "predictions";

/// Shape and dtype of one tensor in the export signature; -1 is the batch dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name:  String,
    pub dtype: String,
    pub shape: Vec<i64>,
}

impl TensorInfo {
    fn new(name: &str, dtype: &str, shape: &[i64]) -> Self {
        Self { name: name.to_string(), dtype: dtype.to_string(), shape: shape.to_vec() }
    }
}

/// What a serving stack needs to call the exported model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSignature {
    pub key:     String,
    /// Mode the signature is served in, parsed with `Mode::from_str`
    pub method:  String,
    pub inputs:  Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
}

impl Default for ExportSignature {
    fn default() -> Self {
        Self {
            key:     PREDICTIONS_KEY.to_string(),
            method:  Mode::Predict.as_str().to_string(),
            inputs:  vec![TensorInfo::new("images", "float32", &[-1, IMAGE_PIXELS as i64])],
            outputs: vec![
                TensorInfo::new("classes", "int64", &[-1]),
                TensorInfo::new("probabilities", "float32", &[-1, NUM_CLASSES as i64]),
            ],
        }
    }
}

pub struct PredictSpec<B: Backend> {
    /// [batch] index of the largest logit
    pub classes:       Tensor<B, 1, Int>,
    /// [batch, 10] softmax over the logits, rows sum to 1
    pub probabilities: Tensor<B, 2>,
    pub export:        ExportSignature,
}

pub struct TrainSpec<B: AutodiffBackend> {
    pub loss:      f64,
    pub gradients: B::Gradients,
    pub optimizer: OptimizerSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalSpec {
    pub loss:     f64,
    pub accuracy: f64,
    pub examples: usize,
}

pub enum ModelSpec<B: AutodiffBackend> {
    Predict(PredictSpec<B::InnerBackend>),
    Train(TrainSpec<B>),
    Eval(EvalSpec),
}

impl<B: AutodiffBackend> ModelSpec<B> {
    pub fn mode(&self) -> Mode {
        match self {
            ModelSpec::Predict(_) => Mode::Predict,
            ModelSpec::Train(_)   => Mode::Train,
            ModelSpec::Eval(_)    => Mode::Eval,
        }
    }
}

/// Run the model once in `mode` and wrap the result for that mode.
pub fn model_fn<B: AutodiffBackend>(
    model:    &CnnModel<B>,
    features: Tensor<B, 2>,
    labels:   Option<Tensor<B, 1, Int>>,
    mode:     Mode,
    hp:       &Hyperparameters,
) -> Result<ModelSpec<B>, ModelError> {
    match mode {
        Mode::Predict => {
            let logits = model.valid().forward(features.inner());
            Ok(ModelSpec::Predict(predict_spec(logits)))
        }
        Mode::Train => {
            let labels = labels.ok_or(ModelError::MissingLabels(mode))?;
            let logits = model.forward(features);
            Ok(ModelSpec::Train(train_spec(logits, labels, hp)))
        }
        Mode::Eval => {
            let labels = labels.ok_or(ModelError::MissingLabels(mode))?;
            let logits = model.valid().forward(features.inner());
            Ok(ModelSpec::Eval(eval_spec(logits, labels.inner())))
        }
    }
}

pub fn predict_spec<B: Backend>(logits: Tensor<B, 2>) -> PredictSpec<B> {
    let classes       = logits.clone().argmax(1).flatten::<1>(0, 1);
    let probabilities = softmax(logits, 1);
    PredictSpec { classes, probabilities, export: ExportSignature::default() }
}

pub fn train_spec<B: AutodiffBackend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    hp:     &Hyperparameters,
) -> TrainSpec<B> {
    let loss = cross_entropy(logits, labels);
    let value: f64 = loss.clone().into_scalar().elem::<f64>();
    TrainSpec {
        loss:      value,
        gradients: loss.backward(),
        optimizer: hp.optimizer_settings(),
    }
}

pub fn eval_spec<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> EvalSpec {
    let examples = labels.dims()[0];
    let predicted = logits.clone().argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predicted
        .equal(labels.clone())
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    let loss: f64 = cross_entropy(logits, labels).into_scalar().elem::<f64>();

    EvalSpec {
        loss,
        accuracy: if examples > 0 { correct as f64 / examples as f64 } else { 0.0 },
        examples,
    }
}

/// Sparse softmax cross-entropy, averaged over the batch.
fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, labels)
}

/// The objective line harvested by the search service.
pub fn objective_line(loss: f64, step: usize) -> String {
    format!("loss = {loss:.6}, step = {step}")
}

pub fn log_objective(loss: f64, step: usize) {
    tracing::info!("{}", objective_line(loss, step));
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::domain::hyperparameters::OptimizerKind;
    use crate::ml::model::CnnConfig;

    type TestBackend = NdArray;
    type TestAutodiff = Autodiff<TestBackend>;

    fn fixed_logits(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            TensorData::new(vec![2.0f32, 0.5, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], [1, 10]),
            device,
        )
    }

    #[test]
    fn test_predict_on_fixed_logits() {
        let device = Default::default();
        let spec   = predict_spec(fixed_logits(&device));

        let classes = spec.classes.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(classes, vec![0]);

        let probs = spec.probabilities.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(probs.len(), 10);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "probabilities sum to {sum}");
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
        assert_eq!(spec.export.key, "predictions");
    }

    #[test]
    fn test_eval_accuracy_and_loss() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(
                vec![
                    5.0f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                    0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                ],
                [2, 10],
            ),
            &device,
        );
        // First row right, second row wrong.
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 4], [2]), &device);

        let spec = eval_spec(logits, labels);
        assert_eq!(spec.examples, 2);
        assert!((spec.accuracy - 0.5).abs() < 1e-9);
        assert!(spec.loss > 0.0);
    }

    #[test]
    fn test_uniform_logits_loss_is_ln_ten() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([4, 10], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 3, 7, 9], [4]), &device);
        let spec   = eval_spec(logits, labels);
        assert!((spec.loss - 10f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_model_fn_dispatches_each_mode() {
        let device   = Default::default();
        let hp       = Hyperparameters { nw_depth: 1, ..Hyperparameters::default() };
        let model    = CnnConfig::from_hyperparameters(&hp).init::<TestAutodiff>(&device).unwrap();
        let features = Tensor::<TestAutodiff, 2>::ones([2, IMAGE_PIXELS], &device);
        let labels   = Tensor::<TestAutodiff, 1, Int>::from_data(TensorData::new(vec![1i64, 2], [2]), &device);

        let spec = model_fn(&model, features.clone(), None, Mode::Predict, &hp).unwrap();
        assert_eq!(spec.mode(), Mode::Predict);

        let spec = model_fn(&model, features.clone(), Some(labels.clone()), Mode::Eval, &hp).unwrap();
        match spec {
            ModelSpec::Eval(eval) => assert_eq!(eval.examples, 2),
            _ => panic!("expected eval spec"),
        }

        let spec = model_fn(&model, features, Some(labels), Mode::Train, &hp).unwrap();
        match spec {
            ModelSpec::Train(train) => {
                assert!(train.loss.is_finite());
                assert_eq!(train.optimizer.kind, OptimizerKind::Adam);
                assert_eq!(train.optimizer.learning_rate, hp.learning_rate);
            }
            _ => panic!("expected train spec"),
        }
    }

    #[test]
    fn test_train_spec_uses_fixed_sgd_rate() {
        let device = Default::default();
        let hp = Hyperparameters {
            nw_depth:       0,
            learning_rate:  0.0005,
            optimizer_type: OptimizerKind::Sgd,
            ..Hyperparameters::default()
        };
        let model    = CnnConfig::from_hyperparameters(&hp).init::<TestAutodiff>(&device).unwrap();
        let features = Tensor::<TestAutodiff, 2>::zeros([1, IMAGE_PIXELS], &device);
        let labels   = Tensor::<TestAutodiff, 1, Int>::from_data(TensorData::new(vec![3i64], [1]), &device);

        match model_fn(&model, features, Some(labels), Mode::Train, &hp).unwrap() {
            ModelSpec::Train(train) => {
                assert_eq!(train.optimizer.kind, OptimizerKind::Sgd);
                assert_eq!(train.optimizer.learning_rate, 0.001);
            }
            _ => panic!("expected train spec"),
        }
    }

    fn to_vec(t: Tensor<impl Backend, 2>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_dropout_is_live_only_in_train_mode() {
        let device   = Default::default();
        let hp       = Hyperparameters { nw_depth: 0, dropout_rate: 0.8, ..Hyperparameters::default() };
        let model    = CnnConfig::from_hyperparameters(&hp).init::<TestAutodiff>(&device).unwrap();
        let features = Tensor::<TestAutodiff, 2>::ones([4, IMAGE_PIXELS], &device);
        let labels   = Tensor::<TestAutodiff, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 2, 3], [4]), &device);

        let predict = || match model_fn(&model, features.clone(), None, Mode::Predict, &hp).unwrap() {
            ModelSpec::Predict(spec) => to_vec(spec.probabilities),
            _ => panic!("expected predict spec"),
        };
        assert_eq!(predict(), predict());

        let eval = || match model_fn(&model, features.clone(), Some(labels.clone()), Mode::Eval, &hp).unwrap() {
            ModelSpec::Eval(spec) => spec.loss,
            _ => panic!("expected eval spec"),
        };
        assert_eq!(eval(), eval());

        // Training draws a fresh mask over the dense layer on every forward pass.
        let first  = to_vec(model.forward(features.clone()));
        let second = to_vec(model.forward(features.clone()));
        assert_ne!(first, second);

        let zeros = |v: Vec<f32>| v.iter().filter(|x| **x == 0.0).count();
        let dropped = zeros(to_vec(model.features(features.clone())));
        let kept    = zeros(to_vec(model.valid().features(features.inner())));
        assert!(dropped > kept, "{dropped} zeros with dropout, {kept} without");
    }

    #[test]
    fn test_missing_labels_rejected() {
        let device   = Default::default();
        let hp       = Hyperparameters { nw_depth: 0, ..Hyperparameters::default() };
        let model    = CnnConfig::from_hyperparameters(&hp).init::<TestAutodiff>(&device).unwrap();
        let features = Tensor::<TestAutodiff, 2>::zeros([1, IMAGE_PIXELS], &device);

        for mode in [Mode::Train, Mode::Eval] {
            let err = model_fn(&model, features.clone(), None, mode, &hp).err().unwrap();
            assert!(matches!(err, ModelError::MissingLabels(m) if m == mode));
        }
    }

    #[test]
    fn test_objective_line_matches_search_regex() {
        let line = objective_line(0.000012345, 100);
        assert_eq!(line, "loss = 0.000012, step = 100");
        let re = regex::Regex::new(r"loss = ([0-9\.]+)").unwrap();
        assert_eq!(&re.captures(&objective_line(2.302585, 1)).unwrap()[1], "2.302585");
    }
}
