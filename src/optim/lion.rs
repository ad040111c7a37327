use itertools::izip;

use crate::error::{Error, Result};
use crate::optim::{open_unit, positive, Optimizer, ParamSet};
use crate::tensor::{Float, TensorList};

/// Sign-based update: `p -= lr * sign(b1 * m + (1 - b1) * g)`, then
/// `m = b2 * m + (1 - b2) * g`.
pub struct Lion<T: Float> {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    set: Option<ParamSet<T>>,
    momentum: TensorList<T>,
    iterations: usize,
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

impl<T: Float> Lion<T> {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64) -> Result<Self> {
        positive("learning rate", learning_rate)?;
        open_unit("beta1", beta1)?;
        open_unit("beta2", beta2)?;
        Ok(Lion {
            learning_rate,
            beta1,
            beta2,
            set: None,
            momentum: vec![],
            iterations: 0,
        })
    }
}

impl<T: Float> Default for Lion<T> {
    fn default() -> Self {
        Lion {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.99,
            set: None,
            momentum: vec![],
            iterations: 0,
        }
    }
}

impl<T: Float> Optimizer<T> for Lion<T> {
    fn name(&self) -> &'static str {
        "Lion"
    }

    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()> {
        let set = ParamSet::new(self.name(), params, grads)?;
        self.momentum = set.state();
        self.set = Some(set);
        self.iterations = 0;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotConstructed("Lion"))?;
        let (lr, b1, b2) = (
            T::lit(self.learning_rate),
            T::lit(self.beta1),
            T::lit(self.beta2),
        );
        for ((param, grad), momentum) in izip!(set.pairs(), &self.momentum) {
            let g = grad.to_vec();
            let mut m = momentum.to_vec();
            param.map_indexed_inplace(|i, p| {
                let direction = sign(b1 * m[i] + (T::one() - b1) * g[i]);
                m[i] = b2 * m[i] + (T::one() - b2) * g[i];
                p - lr * direction
            });
            momentum.assign(&m)?;
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
fn test_lion_steps_by_sign() {
    use crate::tensor::Tensor;

    let mut opt = Lion::new(0.5, 0.9, 0.99).unwrap();
    let param = Tensor::from([0.0f64, 0.0, 0.0]);
    opt.construct(vec![param.clone()], vec![Tensor::from([3.0, -1e-4, 0.0])])
        .unwrap();
    opt.update().unwrap();
    assert_eq!(param.to_vec(), vec![-0.5, 0.5, 0.0]);
}
