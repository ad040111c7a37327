use itertools::izip;

use crate::error::{Error, Result};
use crate::optim::{open_unit, positive, Optimizer, ParamSet};
use crate::tensor::{Float, TensorList};

/// `a = rho * a + (1 - rho) * g²`, `p -= lr * g / (sqrt(a) + eps)`.
pub struct RmsProp<T: Float> {
    learning_rate: f64,
    rho: f64,
    epsilon: f64,
    set: Option<ParamSet<T>>,
    average: TensorList<T>,
    iterations: usize,
}

impl<T: Float> RmsProp<T> {
    pub fn new(learning_rate: f64, rho: f64, epsilon: f64) -> Result<Self> {
        positive("learning rate", learning_rate)?;
        open_unit("rho", rho)?;
        positive("epsilon", epsilon)?;
        Ok(RmsProp {
            learning_rate,
            rho,
            epsilon,
            set: None,
            average: vec![],
            iterations: 0,
        })
    }
}

impl<T: Float> Default for RmsProp<T> {
    fn default() -> Self {
        RmsProp {
            learning_rate: 0.001,
            rho: 0.99,
            epsilon: 1e-7,
            set: None,
            average: vec![],
            iterations: 0,
        }
    }
}

impl<T: Float> Optimizer<T> for RmsProp<T> {
    fn name(&self) -> &'static str {
        "RMSProp"
    }

    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()> {
        let set = ParamSet::new(self.name(), params, grads)?;
        self.average = set.state();
        self.set = Some(set);
        self.iterations = 0;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotConstructed("RMSProp"))?;
        let (lr, rho, eps) = (T::lit(self.learning_rate), T::lit(self.rho), T::lit(self.epsilon));
        for ((param, grad), state) in izip!(set.pairs(), &self.average) {
            let g = grad.to_vec();
            let mut average = state.to_vec();
            param.map_indexed_inplace(|i, p| {
                average[i] = rho * average[i] + (T::one() - rho) * g[i] * g[i];
                p - lr * g[i] / (average[i].sqrt() + eps)
            });
            state.assign(&average)?;
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
fn test_rmsprop_first_step() {
    use crate::tensor::Tensor;

    let mut opt = RmsProp::new(0.01, 0.9, 1e-7).unwrap();
    let param = Tensor::from([1.0f64, 1.0]);
    opt.construct(vec![param.clone()], vec![Tensor::from([2.0, -0.5])])
        .unwrap();
    opt.update().unwrap();
    // a = 0.1 g², so the step is lr * g / (|g| sqrt(0.1))
    let step = 0.01 / 0.1f64.sqrt();
    assert!((param.get(&[0]).unwrap() - (1.0 - step)).abs() < 1e-6);
    assert!((param.get(&[1]).unwrap() - (1.0 + step)).abs() < 1e-6);
    assert!(RmsProp::<f64>::new(0.01, 1.5, 1e-7).is_err());
}
