use std::ops::ControlFlow;
use std::time::Instant;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::nn::Sequential;
use crate::tensor::{Float, Tensor};
use crate::train::{shuffle_lockstep, EpochInfo, History, TrainConfig};

/// Runs epochs of zero-grad, forward, loss, backward and update.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Trainer { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Trains `model` on the pairs `(xs[i], ys[i])`.
    ///
    /// `callback` runs after every epoch; returning `ControlFlow::Break(())`
    /// ends the run early. The model is in training mode while this runs and
    /// in inference mode afterwards, also when an error stops the run.
    pub fn fit<T: Float>(
        &self,
        model: &mut Sequential<T>,
        xs: &[Tensor<T>],
        ys: &[Tensor<T>],
        callback: impl FnMut(&EpochInfo<T>) -> ControlFlow<()>,
    ) -> Result<History<T>> {
        validate(model, xs, ys)?;
        model.set_training(true);
        let result = self.run(model, xs, ys, callback);
        model.set_training(false);
        result
    }

    /// Trains without a callback.
    pub fn train<T: Float>(
        &self,
        model: &mut Sequential<T>,
        xs: &[Tensor<T>],
        ys: &[Tensor<T>],
    ) -> Result<History<T>> {
        self.fit(model, xs, ys, |_| ControlFlow::Continue(()))
    }

    fn run<T: Float>(
        &self,
        model: &mut Sequential<T>,
        xs: &[Tensor<T>],
        ys: &[Tensor<T>],
        mut callback: impl FnMut(&EpochInfo<T>) -> ControlFlow<()>,
    ) -> Result<History<T>> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let (mut xs, mut ys) = (xs.to_vec(), ys.to_vec());
        let samples = T::lit(xs.len() as f64);
        let mut history = History { losses: vec![] };
        let start = Instant::now();
        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                shuffle_lockstep(&mut xs, &mut ys, &mut rng)?;
            }
            let total = if self.config.is_batched() {
                self.batch_epoch(model, &xs, &ys)?
            } else {
                sample_epoch(model, &xs, &ys)?
            };
            let info = EpochInfo {
                epoch,
                loss: total / samples,
                elapsed: start.elapsed(),
            };
            info!(
                "epoch {}/{}: loss {:.6} ({:.2?})",
                epoch + 1,
                self.config.epochs,
                info.loss,
                info.elapsed
            );
            if !info.loss.is_finite() {
                warn!("epoch {} produced a non-finite loss", epoch + 1);
            }
            if self.config.track_history {
                history.losses.push(info.loss);
            }
            if callback(&info).is_break() {
                info!("stopping after epoch {} on request", epoch + 1);
                break;
            }
        }
        Ok(history)
    }

    /// Returns `Σ batch_loss * batch_len`.
    fn batch_epoch<T: Float>(&self, model: &mut Sequential<T>, xs: &[Tensor<T>], ys: &[Tensor<T>]) -> Result<T> {
        let mut total = T::zero();
        for (x_chunk, y_chunk) in xs
            .chunks(self.config.batch_size)
            .zip(ys.chunks(self.config.batch_size))
        {
            let x = Tensor::stack(x_chunk)?;
            let y = Tensor::stack(y_chunk)?;
            let loss = model.train_on_batch(&x, &y)?;
            total += loss * T::lit(x_chunk.len() as f64);
        }
        Ok(total)
    }
}

/// Returns the summed per-sample loss.
fn sample_epoch<T: Float>(model: &mut Sequential<T>, xs: &[Tensor<T>], ys: &[Tensor<T>]) -> Result<T> {
    let mut total = T::zero();
    for (x, y) in xs.iter().zip(ys) {
        total += model.train_on_batch(x, y)?;
    }
    Ok(total)
}

fn validate<T: Float>(model: &Sequential<T>, xs: &[Tensor<T>], ys: &[Tensor<T>]) -> Result<()> {
    if model.optimizer_name().is_none() {
        return Err(Error::NotCompiled);
    }
    if xs.is_empty() || ys.is_empty() {
        return Err(Error::EmptyDataset);
    }
    if xs.len() != ys.len() {
        return Err(Error::LengthMismatch {
            context: "training labels",
            expected: xs.len(),
            actual: ys.len(),
        });
    }
    let input_shape = model.input_shape().ok_or(Error::NotCompiled)?;
    let output_shape = model.output_shape().ok_or(Error::NotCompiled)?;
    for x in xs {
        x.expect_shape("training input", input_shape)?;
    }
    for y in ys {
        y.expect_shape("training label", output_shape)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::Loss;
    use crate::nn::{Activation, Linear};
    use crate::optim::Sgd;

    fn regression() -> (Sequential<f64>, Vec<Tensor<f64>>, Vec<Tensor<f64>>) {
        let mut model = Sequential::new();
        model.add(Linear::new(1, Activation::Linear).unwrap()).unwrap();
        model
            .compile(Sgd::new(0.05, 0.0, false).unwrap(), Loss::MeanSquaredError, &[1])
            .unwrap();
        let xs: Vec<_> = (0..8).map(|i| Tensor::from([f64::from(i) / 4.0])).collect();
        let ys = xs.iter().map(|x| x.map(|v| 3.0 * v - 1.0)).collect();
        (model, xs, ys)
    }

    #[test]
    fn test_callback_can_stop_early() {
        let (mut model, xs, ys) = regression();
        let trainer = Trainer::new(TrainConfig::default().with_epochs(20));
        let mut seen = vec![];
        let history = trainer
            .fit(&mut model, &xs, &ys, |info| {
                seen.push(info.epoch);
                if info.epoch == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(history.epochs(), 3);
        assert!(!model.is_training());
    }

    #[test]
    fn test_validation_errors() {
        let (mut model, xs, ys) = regression();
        let trainer = Trainer::default();
        assert_eq!(trainer.train(&mut model, &[], &[]).unwrap_err(), Error::EmptyDataset);
        assert!(matches!(
            trainer.train(&mut model, &xs, &ys[..3]),
            Err(Error::LengthMismatch { .. })
        ));
        let wide = vec![Tensor::from([1.0, 2.0]); xs.len()];
        assert!(matches!(
            trainer.train(&mut model, &wide, &ys),
            Err(Error::ShapeMismatch { .. })
        ));
        let mut open = Sequential::<f64>::new();
        assert_eq!(trainer.train(&mut open, &xs, &ys).unwrap_err(), Error::NotCompiled);
    }

    #[test]
    fn test_history_is_optional() {
        let (mut model, xs, ys) = regression();
        let trainer = Trainer::new(
            TrainConfig::default()
                .with_epochs(3)
                .with_batch_size(4)
                .with_history(false),
        );
        assert!(trainer.train(&mut model, &xs, &ys).unwrap().losses.is_empty());
    }
}
