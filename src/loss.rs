use std::fmt;

use itertools::izip;

use crate::error::Result;
use crate::tensor::{Float, Tensor};

const LOG_EPSILON: f64 = 1e-7;

/// Scalar training objectives.
///
/// Every loss except [`Loss::CrossEntropy`] averages over all elements, so the
/// gradient of a stacked batch is the mean of the per-sample gradients.
/// Cross-entropy sums over classes and averages over the leading axis of a
/// rank 2 prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loss {
    #[default]
    MeanSquaredError,
    MeanAbsoluteError,
    RootMeanSquaredError,
    MeanSquaredLogError,
    CrossEntropy,
    BinaryCrossEntropy,
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Loss::MeanSquaredError => "mse",
            Loss::MeanAbsoluteError => "mae",
            Loss::RootMeanSquaredError => "rmse",
            Loss::MeanSquaredLogError => "msle",
            Loss::CrossEntropy => "cross_entropy",
            Loss::BinaryCrossEntropy => "binary_cross_entropy",
        };
        write!(f, "{name}")
    }
}

fn sign<T: Float>(value: T) -> T {
    if value > T::zero() {
        T::one()
    } else if value < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

/// Number of rows cross-entropy averages over.
fn rows<T: Float>(pred: &Tensor<T>) -> usize {
    match pred.shape() {
        [rows, _] => (*rows).max(1),
        _ => 1,
    }
}

impl Loss {
    pub fn forward<T: Float>(&self, pred: &Tensor<T>, real: &Tensor<T>) -> Result<T> {
        pred.check_same_shape("loss", real)?;
        let (p, r) = (pred.to_vec(), real.to_vec());
        let n = T::lit(p.len().max(1) as f64);
        let eps = T::lit(LOG_EPSILON);
        let one = T::one();
        let value = match self {
            Loss::MeanSquaredError => izip!(&p, &r).map(|(&p, &r)| (p - r) * (p - r)).sum::<T>() / n,
            Loss::MeanAbsoluteError => izip!(&p, &r).map(|(&p, &r)| (p - r).abs()).sum::<T>() / n,
            Loss::RootMeanSquaredError => {
                (izip!(&p, &r).map(|(&p, &r)| (p - r) * (p - r)).sum::<T>() / n).sqrt()
            }
            Loss::MeanSquaredLogError => {
                izip!(&p, &r)
                    .map(|(&p, &r)| {
                        let d = (one + p).ln() - (one + r).ln();
                        d * d
                    })
                    .sum::<T>()
                    / n
            }
            Loss::CrossEntropy => {
                let total = izip!(&p, &r).map(|(&p, &r)| r * (p + eps).ln()).sum::<T>();
                -total / T::lit(rows(pred) as f64)
            }
            Loss::BinaryCrossEntropy => {
                let total = izip!(&p, &r)
                    .map(|(&p, &r)| r * (p + eps).ln() + (one - r) * (one - p + eps).ln())
                    .sum::<T>();
                -total / n
            }
        };
        Ok(value)
    }

    /// Gradient of [`Loss::forward`] with respect to `pred`.
    pub fn backward<T: Float>(&self, pred: &Tensor<T>, real: &Tensor<T>) -> Result<Tensor<T>> {
        pred.check_same_shape("loss gradient", real)?;
        let n = T::lit(pred.len().max(1) as f64);
        let eps = T::lit(LOG_EPSILON);
        let one = T::one();
        let two = T::lit(2.0);
        let grad = match self {
            Loss::MeanSquaredError => pred.map2(real, |p, r| two * (p - r) / n)?,
            Loss::MeanAbsoluteError => pred.map2(real, |p, r| sign(p - r) / n)?,
            Loss::RootMeanSquaredError => {
                let rmse = self.forward(pred, real)?;
                if rmse == T::zero() {
                    pred.zeros_like()
                } else {
                    pred.map2(real, |p, r| (p - r) / (rmse * n))?
                }
            }
            Loss::MeanSquaredLogError => pred.map2(real, |p, r| {
                two * ((one + p).ln() - (one + r).ln()) / ((one + p) * n)
            })?,
            Loss::CrossEntropy => {
                let rows = T::lit(rows(pred) as f64);
                pred.map2(real, |p, r| -r / ((p + eps) * rows))?
            }
            Loss::BinaryCrossEntropy => pred.map2(real, |p, r| {
                (-r / (p + eps) + (one - r) / (one - p + eps)) / n
            })?,
        };
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Loss; 6] = [
        Loss::MeanSquaredError,
        Loss::MeanAbsoluteError,
        Loss::RootMeanSquaredError,
        Loss::MeanSquaredLogError,
        Loss::CrossEntropy,
        Loss::BinaryCrossEntropy,
    ];

    #[test]
    fn test_mse_value_and_gradient() {
        let pred: Tensor<f64> = Tensor::from([1.0, 2.0, 4.0]);
        let real = Tensor::from([1.0, 0.0, 1.0]);
        let loss = Loss::MeanSquaredError;
        assert!((loss.forward(&pred, &real).unwrap() - 13.0 / 3.0).abs() < 1e-12);
        let grad = loss.backward(&pred, &real).unwrap();
        assert!(grad.max_abs_diff(&Tensor::from([0.0, 4.0 / 3.0, 2.0])).unwrap() < 1e-12);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let pred = Tensor::from([0.3, 0.6, 0.1]);
        let real = Tensor::from([0.0, 1.0, 0.0]);
        let h = 1e-6;
        for loss in ALL {
            let grad = loss.backward(&pred, &real).unwrap();
            for i in 0..3 {
                let shifted = |delta: f64| {
                    let p = pred.deep_clone();
                    p.set(&[i], p.get(&[i]).unwrap() + delta).unwrap();
                    loss.forward(&p, &real).unwrap()
                };
                let numeric = (shifted(h) - shifted(-h)) / (2.0 * h);
                let analytic = grad.get(&[i]).unwrap();
                assert!(
                    (numeric - analytic).abs() < 1e-4,
                    "{loss}: {numeric} vs {analytic}"
                );
            }
        }
    }

    #[test]
    fn test_cross_entropy_averages_over_batch_rows() {
        let one: Tensor<f64> = Tensor::from([0.2, 0.8]);
        let label = Tensor::from([0.0, 1.0]);
        let batch = Tensor::stack(&[one.clone(), one.clone()]).unwrap();
        let labels = Tensor::stack(&[label.clone(), label.clone()]).unwrap();
        let single = Loss::CrossEntropy.forward(&one, &label).unwrap();
        let batched = Loss::CrossEntropy.forward(&batch, &labels).unwrap();
        assert!((single - batched).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let pred = Tensor::from([1.0f32, 2.0]);
        let real = Tensor::from([[1.0f32, 2.0]]);
        for loss in ALL {
            assert!(loss.forward(&pred, &real).is_err());
            assert!(loss.backward(&pred, &real).is_err());
        }
    }
}
