//! Gradient-based parameter updates.
//!
//! An optimizer is bound once, through [`Optimizer::construct`], to the
//! parameter tensors of a model and to the gradient tensors the layers
//! accumulate into. Both lists are aliasing handles, so every
//! [`Optimizer::update`] rewrites the model's parameters in place using the
//! gradients currently stored. Per-parameter state (velocities, moment
//! estimates) is allocated in `construct` and lives until the next one.

mod adadelta;
mod adagrad;
mod adam;
mod amsgrad;
mod lion;
mod nadam;
mod rmsprop;
mod sgd;

pub use adadelta::Adadelta;
pub use adagrad::AdaGrad;
pub use adam::Adam;
pub use amsgrad::AmsGrad;
pub use lion::Lion;
pub use nadam::Nadam;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

use itertools::Itertools;
use log::debug;

use crate::error::{Error, Result};
use crate::tensor::{Float, Tensor, TensorList};

pub trait Optimizer<T: Float> {
    fn name(&self) -> &'static str;

    /// Binds the optimizer to `params` and their `grads`, resetting any state.
    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()>;

    /// Applies one step using the gradients currently stored.
    fn update(&mut self) -> Result<()>;

    fn is_constructed(&self) -> bool;

    /// Number of completed `update` calls since `construct`.
    fn iterations(&self) -> usize;
}

/// Validated, index-aligned parameters and gradients.
pub(crate) struct ParamSet<T: Float> {
    params: TensorList<T>,
    grads: TensorList<T>,
}

impl<T: Float> ParamSet<T> {
    pub(crate) fn new(name: &'static str, params: TensorList<T>, grads: TensorList<T>) -> Result<Self> {
        if params.len() != grads.len() {
            return Err(Error::LengthMismatch {
                context: "optimizer gradients",
                expected: params.len(),
                actual: grads.len(),
            });
        }
        for (param, grad) in params.iter().zip_eq(&grads) {
            grad.expect_shape("optimizer gradient", param.shape())?;
        }
        debug!(
            "constructed {name} over {} tensors ({} values)",
            params.len(),
            params.iter().map(Tensor::len).sum::<usize>()
        );
        Ok(ParamSet { params, grads })
    }

    /// One zero-filled state tensor per parameter, shaped like it.
    pub(crate) fn state(&self) -> TensorList<T> {
        self.filled_state(T::zero())
    }

    pub(crate) fn filled_state(&self, value: T) -> TensorList<T> {
        self.params
            .iter()
            .map(|param| Tensor::new_with_filler(param.shape().to_vec(), value))
            .collect()
    }

    pub(crate) fn pairs(&self) -> impl Iterator<Item = (&Tensor<T>, &Tensor<T>)> {
        self.params.iter().zip_eq(&self.grads)
    }
}

pub(crate) fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("{name} must be positive, got {value}")))
    }
}

pub(crate) fn non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("{name} must not be negative, got {value}")))
    }
}

/// Decay rates live strictly inside `(0, 1)`.
pub(crate) fn open_unit(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("{name} must lie in (0, 1), got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_set_validates_pairs() {
        let params = vec![Tensor::<f64>::zeros(&[2, 2]), Tensor::zeros(&[2])];
        let wrong = vec![Tensor::zeros(&[2, 2]), Tensor::zeros(&[3])];
        assert!(matches!(
            ParamSet::new("test", params.clone(), wrong),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            ParamSet::new("test", params.clone(), vec![]),
            Err(Error::LengthMismatch { .. })
        ));
        let set = ParamSet::new("test", params.clone(), vec![Tensor::zeros(&[2, 2]), Tensor::zeros(&[2])])
            .unwrap();
        assert_eq!(set.state()[0].len(), 4);
    }

    #[test]
    fn test_state_tensors_follow_parameter_shapes() {
        let params = vec![Tensor::<f64>::zeros(&[3, 2]), Tensor::zeros(&[2, 1, 2, 2]), Tensor::zeros(&[4])];
        let grads = params.iter().map(|param| Tensor::zeros(param.shape())).collect();
        let set = ParamSet::new("test", params.clone(), grads).unwrap();
        let state = set.filled_state(0.1);
        assert_eq!(state.len(), params.len());
        for (param, slot) in params.iter().zip(&state) {
            assert_eq!(slot.shape(), param.shape());
            assert!(slot.to_vec().iter().all(|&value| value == 0.1));
        }
        // state buffers are fresh, never aliases of the parameters
        state[0].fill(5.0);
        assert!(params[0].to_vec().iter().all(|&value| value == 0.0));
        assert!(set.state().iter().all(|slot| slot.norm() == 0.0));
    }

    #[test]
    fn test_hyperparameter_checks() {
        assert!(positive("lr", 0.0).is_err());
        assert!(positive("lr", f64::INFINITY).is_err());
        assert!(non_negative("momentum", 0.0).is_ok());
        assert!(open_unit("rho", 1.0).is_err());
        assert!(open_unit("rho", 0.9).is_ok());
    }
}
