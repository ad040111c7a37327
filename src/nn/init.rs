use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::{Error, Result};
use crate::tensor::{Float, Tensor};

/// Strategies for drawing a parameter's initial values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Initializer {
    Zeros,
    Constant(f64),
    Uniform {
        low: f64,
        high: f64,
    },
    Gaussian {
        mean: f64,
        std: f64,
    },
    #[default]
    GlorotUniform,
    GlorotNormal,
    He,
    HeUniform,
    LeCun,
    LeCunUniform,
    /// Ones on the diagonal of a matrix.
    Identity,
}

/// `(fan_in, fan_out)` of a parameter shape.
pub fn fans(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [n] => (*n, *n),
        [rows, cols] => (*rows, *cols),
        _ => (
            shape[..shape.len() - 1].iter().product(),
            shape[1..].iter().product(),
        ),
    }
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std)
        .map_err(|err| Error::InvalidParameter(format!("normal({mean}, {std}): {err}")))
}

fn uniform(low: f64, high: f64) -> Result<Uniform<f64>> {
    if !(low < high) {
        return Err(Error::InvalidParameter(format!(
            "uniform range [{low}, {high}) is empty"
        )));
    }
    Ok(Uniform::new(low, high))
}

fn fill_from<T: Float>(tensor: &Tensor<T>, rng: &mut StdRng, distribution: impl Distribution<f64>) {
    tensor.map_inplace_with(|| T::lit(distribution.sample(rng)));
}

impl Initializer {
    pub fn name(&self) -> &'static str {
        match self {
            Initializer::Zeros => "zeros",
            Initializer::Constant(_) => "constant",
            Initializer::Uniform { .. } => "uniform",
            Initializer::Gaussian { .. } => "gaussian",
            Initializer::GlorotUniform => "glorot_uniform",
            Initializer::GlorotNormal => "glorot_normal",
            Initializer::He => "he",
            Initializer::HeUniform => "he_uniform",
            Initializer::LeCun => "lecun",
            Initializer::LeCunUniform => "lecun_uniform",
            Initializer::Identity => "identity",
        }
    }

    /// Overwrites `tensor` in place.
    pub fn initialize<T: Float>(&self, tensor: &Tensor<T>, rng: &mut StdRng) -> Result<()> {
        let (fan_in, fan_out) = fans(tensor.shape());
        let (fan_in, fan_out) = (fan_in.max(1) as f64, fan_out.max(1) as f64);
        match *self {
            Initializer::Zeros => tensor.zero(),
            Initializer::Constant(value) => tensor.fill(T::lit(value)),
            Initializer::Uniform { low, high } => fill_from(tensor, rng, uniform(low, high)?),
            Initializer::Gaussian { mean, std } => fill_from(tensor, rng, normal(mean, std)?),
            Initializer::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out)).sqrt();
                fill_from(tensor, rng, uniform(-limit, limit)?)
            }
            Initializer::GlorotNormal => {
                fill_from(tensor, rng, normal(0.0, (2.0 / (fan_in + fan_out)).sqrt())?)
            }
            Initializer::He => fill_from(tensor, rng, normal(0.0, (2.0 / fan_in).sqrt())?),
            Initializer::HeUniform => {
                let limit = (6.0 / fan_in).sqrt();
                fill_from(tensor, rng, uniform(-limit, limit)?)
            }
            Initializer::LeCun => fill_from(tensor, rng, normal(0.0, (1.0 / fan_in).sqrt())?),
            Initializer::LeCunUniform => {
                let limit = (3.0 / fan_in).sqrt();
                fill_from(tensor, rng, uniform(-limit, limit)?)
            }
            Initializer::Identity => {
                if tensor.rank() != 2 {
                    return Err(Error::Unsupported(format!(
                        "identity initialisation needs a matrix, got shape {:?}",
                        tensor.shape()
                    )));
                }
                let cols = tensor.shape()[1];
                tensor.map_indexed_inplace(|i, _| {
                    if i / cols == i % cols {
                        T::one()
                    } else {
                        T::zero()
                    }
                });
            }
        }
        Ok(())
    }
}

/// Random `[lo, hi)` tensor, handy in tests and demos.
pub fn uniform_tensor<T: Float>(shape: &[usize], low: f64, high: f64, rng: &mut StdRng) -> Tensor<T> {
    let tensor = Tensor::zeros(shape);
    tensor.map_inplace_with(|| T::lit(rng.gen_range(low..high)));
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_fans() {
        assert_eq!(fans(&[5]), (5, 5));
        assert_eq!(fans(&[3, 4]), (3, 4));
        assert_eq!(fans(&[8, 3, 2, 2]), (48, 12));
    }

    #[test]
    fn test_glorot_uniform_respects_limit() {
        let mut rng = StdRng::seed_from_u64(42);
        let weights = Tensor::<f64>::zeros(&[20, 30]);
        Initializer::GlorotUniform
            .initialize(&weights, &mut rng)
            .unwrap();
        let limit = (6.0f64 / 50.0).sqrt();
        assert!(weights.to_vec().iter().all(|w| w.abs() <= limit));
        assert!(weights.to_vec().iter().any(|w| *w != 0.0));
    }

    #[test]
    fn test_seeded_initialisation_is_reproducible() {
        let a = Tensor::<f32>::zeros(&[4, 4]);
        let b = Tensor::<f32>::zeros(&[4, 4]);
        Initializer::He
            .initialize(&a, &mut StdRng::seed_from_u64(7))
            .unwrap();
        Initializer::He
            .initialize(&b, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_and_invalid_ranges() {
        let mut rng = StdRng::seed_from_u64(0);
        let eye = Tensor::<f64>::zeros(&[2, 3]);
        Initializer::Identity.initialize(&eye, &mut rng).unwrap();
        assert_eq!(eye.to_vec(), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let bad = Initializer::Uniform {
            low: 1.0,
            high: 1.0,
        };
        assert!(bad.initialize(&eye, &mut rng).is_err());
        assert!(Initializer::Identity
            .initialize(&Tensor::<f64>::zeros(&[3]), &mut rng)
            .is_err());
    }
}
