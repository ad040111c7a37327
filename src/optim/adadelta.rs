use itertools::izip;

use crate::error::{Error, Result};
use crate::optim::{open_unit, positive, Optimizer, ParamSet};
use crate::tensor::{Float, TensorList};

/// Learning-rate free Adadelta.
///
/// ```text
/// a = rho * a + (1 - rho) * g²
/// d = -sqrt(u + eps) / sqrt(a + eps) * g
/// u = rho * u + (1 - rho) * d²
/// p += d
/// ```
pub struct Adadelta<T: Float> {
    rho: f64,
    epsilon: f64,
    set: Option<ParamSet<T>>,
    grad_average: TensorList<T>,
    delta_average: TensorList<T>,
    iterations: usize,
}

impl<T: Float> Adadelta<T> {
    pub fn new(rho: f64, epsilon: f64) -> Result<Self> {
        open_unit("rho", rho)?;
        positive("epsilon", epsilon)?;
        Ok(Adadelta {
            rho,
            epsilon,
            set: None,
            grad_average: vec![],
            delta_average: vec![],
            iterations: 0,
        })
    }
}

impl<T: Float> Default for Adadelta<T> {
    fn default() -> Self {
        Adadelta {
            rho: 0.99,
            epsilon: 1e-8,
            set: None,
            grad_average: vec![],
            delta_average: vec![],
            iterations: 0,
        }
    }
}

impl<T: Float> Optimizer<T> for Adadelta<T> {
    fn name(&self) -> &'static str {
        "Adadelta"
    }

    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()> {
        let set = ParamSet::new(self.name(), params, grads)?;
        self.grad_average = set.state();
        self.delta_average = set.state();
        self.set = Some(set);
        self.iterations = 0;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotConstructed("Adadelta"))?;
        let (rho, eps) = (T::lit(self.rho), T::lit(self.epsilon));
        let keep = T::one() - rho;
        for ((param, grad), grad_average, delta_average) in izip!(
            set.pairs(),
            &self.grad_average,
            &self.delta_average
        ) {
            let g = grad.to_vec();
            let (mut a, mut u) = (grad_average.to_vec(), delta_average.to_vec());
            param.map_indexed_inplace(|i, p| {
                a[i] = rho * a[i] + keep * g[i] * g[i];
                let delta = -(u[i] + eps).sqrt() / (a[i] + eps).sqrt() * g[i];
                u[i] = rho * u[i] + keep * delta * delta;
                p + delta
            });
            grad_average.assign(&a)?;
            delta_average.assign(&u)?;
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

#[test]
fn test_adadelta_moves_against_gradient() {
    use crate::tensor::Tensor;

    let mut opt = Adadelta::default();
    let param = Tensor::from([0.0f64, 0.0]);
    let grad = Tensor::from([1.0, -1.0]);
    opt.construct(vec![param.clone()], vec![grad]).unwrap();
    for _ in 0..5 {
        opt.update().unwrap();
    }
    assert!(param.get(&[0]).unwrap() < 0.0);
    assert!(param.get(&[1]).unwrap() > 0.0);
    assert_eq!(opt.iterations(), 5);
}
