use itertools::Itertools;

use crate::error::{Error, Result};
use crate::optim::{non_negative, positive, Optimizer, ParamSet};
use crate::tensor::{Float, TensorList};

/// Stochastic gradient descent with optional (Nesterov) momentum.
///
/// `v = momentum * v - lr * g`, then `p += v`, or with Nesterov
/// `p += momentum * v - lr * g`. With zero momentum this is plain `p -= lr * g`.
pub struct Sgd<T: Float> {
    learning_rate: f64,
    momentum: f64,
    nesterov: bool,
    set: Option<ParamSet<T>>,
    velocity: TensorList<T>,
    iterations: usize,
}

impl<T: Float> Sgd<T> {
    pub fn new(learning_rate: f64, momentum: f64, nesterov: bool) -> Result<Self> {
        positive("learning rate", learning_rate)?;
        non_negative("momentum", momentum)?;
        Ok(Sgd {
            learning_rate,
            momentum,
            nesterov,
            set: None,
            velocity: vec![],
            iterations: 0,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl<T: Float> Default for Sgd<T> {
    fn default() -> Self {
        Sgd {
            learning_rate: 0.01,
            momentum: 0.0,
            nesterov: false,
            set: None,
            velocity: vec![],
            iterations: 0,
        }
    }
}

impl<T: Float> Optimizer<T> for Sgd<T> {
    fn name(&self) -> &'static str {
        "SGD"
    }

    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()> {
        let set = ParamSet::new(self.name(), params, grads)?;
        self.velocity = set.state();
        self.set = Some(set);
        self.iterations = 0;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotConstructed("SGD"))?;
        let (lr, mu, nesterov) = (T::lit(self.learning_rate), T::lit(self.momentum), self.nesterov);
        for ((param, grad), state) in set.pairs().zip_eq(&self.velocity) {
            let g = grad.to_vec();
            let mut velocity = state.to_vec();
            param.map_indexed_inplace(|i, p| {
                velocity[i] = mu * velocity[i] - lr * g[i];
                if nesterov {
                    p + mu * velocity[i] - lr * g[i]
                } else {
                    p + velocity[i]
                }
            });
            state.assign(&velocity)?;
        }
        self.iterations += 1;
        Ok(())
    }

    fn is_constructed(&self) -> bool {
        self.set.is_some()
    }

    fn iterations(&self) -> usize {
        self.iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    fn bound(optimizer: &mut Sgd<f64>) -> (Tensor<f64>, Tensor<f64>) {
        let param = Tensor::from([1.0, -2.0]);
        let grad = Tensor::from([0.5, -1.0]);
        optimizer
            .construct(vec![param.clone()], vec![grad.clone()])
            .unwrap();
        (param, grad)
    }

    #[test]
    fn test_plain_step() {
        let mut sgd = Sgd::new(0.1, 0.0, false).unwrap();
        let (param, _) = bound(&mut sgd);
        sgd.update().unwrap();
        assert!(param.max_abs_diff(&Tensor::from([0.95, -1.9])).unwrap() < 1e-12);
        assert_eq!(sgd.iterations(), 1);
    }

    #[test]
    fn test_momentum_builds_velocity() {
        let mut sgd = Sgd::new(0.1, 0.9, false).unwrap();
        let (param, _) = bound(&mut sgd);
        sgd.update().unwrap();
        sgd.update().unwrap();
        // v1 = -0.05, v2 = 0.9 * -0.05 - 0.05 = -0.095
        assert!((param.get(&[0]).unwrap() - (1.0 - 0.05 - 0.095)).abs() < 1e-12);
    }

    #[test]
    fn test_nesterov_looks_ahead() {
        let mut sgd = Sgd::new(0.1, 0.9, true).unwrap();
        let (param, _) = bound(&mut sgd);
        sgd.update().unwrap();
        // v = -0.05, step = 0.9 * -0.05 - 0.05
        assert!((param.get(&[0]).unwrap() - (1.0 - 0.095)).abs() < 1e-12);
    }

    #[test]
    fn test_update_before_construct_fails() {
        let mut sgd = Sgd::<f32>::default();
        assert_eq!(sgd.update().unwrap_err(), Error::NotConstructed("SGD"));
        assert!(!sgd.is_constructed());
        assert!(Sgd::<f32>::new(0.0, 0.0, false).is_err());
        assert!(Sgd::<f32>::new(0.1, -0.5, false).is_err());
    }
}
