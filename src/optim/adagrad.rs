use itertools::izip;

use crate::error::{Error, Result};
use crate::optim::{non_negative, positive, Optimizer, ParamSet};
use crate::tensor::{Float, TensorList};

/// `a += g²`, `p -= lr * g / sqrt(a + eps)`.
pub struct AdaGrad<T: Float> {
    learning_rate: f64,
    epsilon: f64,
    initial_accumulator: f64,
    set: Option<ParamSet<T>>,
    accumulator: TensorList<T>,
    iterations: usize,
}

impl<T: Float> AdaGrad<T> {
    pub fn new(learning_rate: f64, epsilon: f64, initial_accumulator: f64) -> Result<Self> {
        positive("learning rate", learning_rate)?;
        positive("epsilon", epsilon)?;
        non_negative("initial accumulator", initial_accumulator)?;
        Ok(AdaGrad {
            learning_rate,
            epsilon,
            initial_accumulator,
            set: None,
            accumulator: vec![],
            iterations: 0,
        })
    }
}

impl<T: Float> Default for AdaGrad<T> {
    fn default() -> Self {
        AdaGrad {
            learning_rate: 0.01,
            epsilon: 1e-7,
            initial_accumulator: 0.1,
            set: None,
            accumulator: vec![],
            iterations: 0,
        }
    }
}

impl<T: Float> Optimizer<T> for AdaGrad<T> {
    fn name(&self) -> &'static str {
        "AdaGrad"
    }

    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()> {
        let set = ParamSet::new(self.name(), params, grads)?;
        self.accumulator = set.filled_state(T::lit(self.initial_accumulator));
        self.set = Some(set);
        self.iterations = 0;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotConstructed("AdaGrad"))?;
        let (lr, eps) = (T::lit(self.learning_rate), T::lit(self.epsilon));
        for ((param, grad), accumulator) in izip!(set.pairs(), &self.accumulator) {
            let g = grad.to_vec();
            let mut a = accumulator.to_vec();
            param.map_indexed_inplace(|i, p| {
                a[i] += g[i] * g[i];
                p - lr * g[i] / (a[i] + eps).sqrt()
            });
            accumulator.assign(&a)?;
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
fn test_adagrad_uses_initial_accumulator() {
    use crate::tensor::Tensor;

    let mut opt = AdaGrad::new(0.1, 1e-12, 0.1).unwrap();
    let param = Tensor::from([1.0f64]);
    opt.construct(vec![param.clone()], vec![Tensor::from([0.3])])
        .unwrap();
    opt.update().unwrap();
    // a = 0.1 + 0.09
    let expected = 1.0 - 0.1 * 0.3 / 0.19f64.sqrt();
    assert!((param.get(&[0]).unwrap() - expected).abs() < 1e-9);
}
