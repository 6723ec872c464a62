// ============================================================
// Layer 5 — Training and Evaluation Loops
// ============================================================
// One trial = one call to `train` followed by one `evaluate`.
//
// Training:
//   - opens a fresh pipeline on the "train" channel
//   - every batch goes through model_fn in Train mode
//   - the optimiser chosen by the hyperparameters applies the
//     gradients (Adam at the assigned rate, SGD at 0.001)
//   - stops at `training_steps` or when the pipeline runs out
//     of passes, whichever comes first
//   - writes the objective line every `log_every_steps` steps
//     and once more for the final step
//
// Evaluation:
//   - opens a fresh pipeline on the "eval" channel
//   - runs model_fn in Eval mode for at most `evaluation_steps`
//     batches, no parameter updates
//   - loss is averaged per example, accuracy is correct/total
//
// Key Burn insight:
//   - The optimiser type differs between Adam and SGD, so the
//     loop is generic over `Optimizer` and the choice is made
//     once, up front.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::{batcher::MnistBatcher, pipeline::InputPipeline};
use crate::domain::hyperparameters::{Hyperparameters, OptimizerKind};
use crate::domain::mode::Mode;
use crate::domain::traits::Channel;
use crate::ml::dispatcher::{log_objective, model_fn, EvalSpec, ModelSpec};
use crate::ml::model::CnnModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopSettings {
    pub training_steps:   usize,
    pub evaluation_steps: usize,
    pub log_every_steps:  usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            training_steps:   1000,
            evaluation_steps: 100,
            log_every_steps:  100,
        }
    }
}

pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model:     CnnModel<B>,
    pub steps:     usize,
    pub last_loss: Option<f64>,
}

pub fn train<B: AutodiffBackend>(
    model:    CnnModel<B>,
    hp:       &Hyperparameters,
    pipeline: &InputPipeline,
    settings: &LoopSettings,
    device:   &B::Device,
) -> Result<TrainingOutcome<B>> {
    let optimizer = hp.optimizer_settings();
    tracing::info!(
        "Training depth {} with {} at learning rate {}",
        model.depth(), optimizer.kind, optimizer.learning_rate
    );

    match optimizer.kind {
        OptimizerKind::Adam => {
            let optim = AdamConfig::new().with_epsilon(1e-8).init::<B, CnnModel<B>>();
            train_with(model, optim, hp, pipeline, settings, device)
        }
        OptimizerKind::Sgd => {
            let optim = SgdConfig::new().init::<B, CnnModel<B>>();
            train_with(model, optim, hp, pipeline, settings, device)
        }
    }
}

fn train_with<B, O>(
    mut model: CnnModel<B>,
    mut optim: O,
    hp:        &Hyperparameters,
    pipeline:  &InputPipeline,
    settings:  &LoopSettings,
    device:    &B::Device,
) -> Result<TrainingOutcome<B>>
where
    B: AutodiffBackend,
    O: Optimizer<CnnModel<B>, B>,
{
    let batcher   = MnistBatcher::<B>::new(device.clone());
    let log_every = settings.log_every_steps.max(1);
    let mut stream    = pipeline.open(Channel::Train);
    let mut step      = 0usize;
    let mut last_loss = None;

    while step < settings.training_steps {
        let Some(batch) = stream.next() else {
            tracing::info!("Train channel exhausted after {} steps", step);
            break;
        };
        let batch = batcher.batch(batch?.examples);

        let spec = match model_fn(&model, batch.images, Some(batch.labels), Mode::Train, hp)? {
            ModelSpec::Train(spec) => spec,
            other => bail!("model_fn produced a {} spec in train mode", other.mode()),
        };

        step += 1;
        let grads = GradientsParams::from_grads(spec.gradients, &model);
        model = optim.step(spec.optimizer.learning_rate, model, grads);

        if step == 1 || step % log_every == 0 {
            log_objective(spec.loss, step);
        }
        last_loss = Some(spec.loss);
    }
    stream.close();

    // Make sure the final objective is always in the log.
    if let Some(loss) = last_loss {
        if step != 1 && step % log_every != 0 {
            log_objective(loss, step);
        }
    }

    Ok(TrainingOutcome { model, steps: step, last_loss })
}

/// Running totals across evaluation batches.
#[derive(Debug, Default)]
struct EvalTotals {
    weighted_loss: f64,
    correct:       f64,
    examples:      usize,
}

impl EvalTotals {
    fn add(&mut self, spec: &EvalSpec) {
        self.weighted_loss += spec.loss * spec.examples as f64;
        self.correct       += spec.accuracy * spec.examples as f64;
        self.examples      += spec.examples;
    }

    fn finish(self) -> EvalSpec {
        if self.examples == 0 {
            return EvalSpec { loss: f64::NAN, accuracy: 0.0, examples: 0 };
        }
        let n = self.examples as f64;
        EvalSpec { loss: self.weighted_loss / n, accuracy: self.correct / n, examples: self.examples }
    }
}

pub fn evaluate<B: AutodiffBackend>(
    model:     &CnnModel<B>,
    hp:        &Hyperparameters,
    pipeline:  &InputPipeline,
    max_steps: usize,
    device:    &B::Device,
) -> Result<EvalSpec> {
    let batcher    = MnistBatcher::<B>::new(device.clone());
    let mut stream = pipeline.open(Channel::Eval);
    let mut totals = EvalTotals::default();
    let mut steps  = 0usize;

    while steps < max_steps {
        let Some(batch) = stream.next() else { break };
        let batch = batcher.batch(batch?.examples);

        match model_fn(model, batch.images, Some(batch.labels), Mode::Eval, hp)? {
            ModelSpec::Eval(spec) => totals.add(&spec),
            other => bail!("model_fn produced a {} spec in eval mode", other.mode()),
        }
        steps += 1;
    }
    stream.close();

    let result = totals.finish();
    if result.examples == 0 {
        tracing::warn!("Eval channel produced no examples");
    }
    tracing::info!(
        "eval: accuracy = {:.6}, mean_cross_entropy = {:.6}, examples = {}",
        result.accuracy, result.loss, result.examples
    );
    Ok(result)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::data::channel::MemoryChannel;
    use crate::data::pipeline::PipelineConfig;
    use crate::data::record::encode_example;
    use crate::domain::example::IMAGE_PIXELS;
    use crate::ml::model::CnnConfig;

    type TestAutodiff = Autodiff<NdArray>;

    fn records(n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|i| {
                let label = (i % 2) as i64;
                // Class 1 images are bright, class 0 images are dark.
                let fill  = if label == 1 { 220u8 } else { 20u8 };
                encode_example(&[fill; IMAGE_PIXELS], label, 28, 28, 1)
            })
            .collect()
    }

    fn pipeline(n: usize, epochs: usize, batch_size: usize) -> InputPipeline {
        let source = MemoryChannel::new()
            .with_records(Channel::Train, records(n))
            .with_records(Channel::Eval, records(n));
        InputPipeline::new(
            Arc::new(source),
            PipelineConfig { epochs, batch_size, ..PipelineConfig::default() },
        )
    }

    fn small_model(hp: &Hyperparameters) -> CnnModel<TestAutodiff> {
        CnnConfig::from_hyperparameters(hp).init(&Default::default()).unwrap()
    }

    #[test]
    fn test_training_stops_at_step_budget() {
        let hp       = Hyperparameters { nw_depth: 0, dropout_rate: 0.0, ..Hyperparameters::default() };
        let settings = LoopSettings { training_steps: 3, evaluation_steps: 1, log_every_steps: 2 };
        let outcome  = train(small_model(&hp), &hp, &pipeline(32, 20, 8), &settings, &Default::default()).unwrap();

        assert_eq!(outcome.steps, 3);
        assert!(outcome.last_loss.unwrap().is_finite());
    }

    #[test]
    fn test_training_stops_when_passes_run_out() {
        let hp       = Hyperparameters { nw_depth: 0, ..Hyperparameters::default() };
        let settings = LoopSettings { training_steps: 1000, ..LoopSettings::default() };
        // 2 passes of 16 records in batches of 8 → 4 steps.
        let outcome  = train(small_model(&hp), &hp, &pipeline(16, 2, 8), &settings, &Default::default()).unwrap();
        assert_eq!(outcome.steps, 4);
    }

    #[test]
    fn test_sgd_path_trains() {
        let hp = Hyperparameters {
            nw_depth:       1,
            optimizer_type: OptimizerKind::Sgd,
            ..Hyperparameters::default()
        };
        let settings = LoopSettings { training_steps: 2, ..LoopSettings::default() };
        let outcome  = train(small_model(&hp), &hp, &pipeline(8, 1, 4), &settings, &Default::default()).unwrap();
        assert_eq!(outcome.steps, 2);
    }

    #[test]
    fn test_adam_learns_a_separable_toy_problem() {
        let hp = Hyperparameters {
            nw_depth:      0,
            dropout_rate:  0.0,
            learning_rate: 0.001,
            ..Hyperparameters::default()
        };
        let device   = Default::default();
        let settings = LoopSettings { training_steps: 40, ..LoopSettings::default() };
        let pipe     = pipeline(32, 20, 16);

        let outcome = train(small_model(&hp), &hp, &pipe, &settings, &device).unwrap();
        let result  = evaluate(&outcome.model, &hp, &pipe, 2, &device).unwrap();

        assert_eq!(result.examples, 32);
        assert!(result.accuracy > 0.9, "accuracy {}", result.accuracy);
    }

    #[test]
    fn test_evaluate_respects_step_limit() {
        let hp     = Hyperparameters { nw_depth: 0, ..Hyperparameters::default() };
        let result = evaluate(&small_model(&hp), &hp, &pipeline(20, 20, 4), 3, &Default::default()).unwrap();
        assert_eq!(result.examples, 12);
        assert!((0.0..=1.0).contains(&result.accuracy));
    }

    #[test]
    fn test_eval_totals_weight_by_examples() {
        let mut totals = EvalTotals::default();
        totals.add(&EvalSpec { loss: 1.0, accuracy: 1.0, examples: 3 });
        totals.add(&EvalSpec { loss: 3.0, accuracy: 0.0, examples: 1 });
        let spec = totals.finish();
        assert_eq!(spec.examples, 4);
        assert!((spec.loss - 1.5).abs() < 1e-12);
        assert!((spec.accuracy - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_eval_has_no_examples() {
        let spec = EvalTotals::default().finish();
        assert_eq!(spec.examples, 0);
        assert!(spec.loss.is_nan());
    }
}
