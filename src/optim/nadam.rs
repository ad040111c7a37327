use itertools::izip;

use crate::error::{Error, Result};
use crate::optim::{open_unit, positive, Optimizer, ParamSet};
use crate::tensor::{Float, TensorList};

/// Adam with a Nesterov look-ahead on the first moment.
///
/// ```text
/// m  = b1 * m + (1 - b1) * g
/// v  = b2 * v + (1 - b2) * g²
/// mh = (b1 * m + (1 - b1) * g) / (1 - b1^t)
/// vh = v / (1 - b2^t)
/// p -= lr * mh / (sqrt(vh) + eps)
/// ```
pub struct Nadam<T: Float> {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    set: Option<ParamSet<T>>,
    first: TensorList<T>,
    second: TensorList<T>,
    iterations: usize,
}

impl<T: Float> Nadam<T> {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Result<Self> {
        positive("learning rate", learning_rate)?;
        open_unit("beta1", beta1)?;
        open_unit("beta2", beta2)?;
        positive("epsilon", epsilon)?;
        Ok(Nadam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            set: None,
            first: vec![],
            second: vec![],
            iterations: 0,
        })
    }
}

impl<T: Float> Default for Nadam<T> {
    fn default() -> Self {
        Nadam {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            set: None,
            first: vec![],
            second: vec![],
            iterations: 0,
        }
    }
}

impl<T: Float> Optimizer<T> for Nadam<T> {
    fn name(&self) -> &'static str {
        "Nadam"
    }

    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()> {
        let set = ParamSet::new(self.name(), params, grads)?;
        self.first = set.state();
        self.second = set.state();
        self.set = Some(set);
        self.iterations = 0;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotConstructed("Nadam"))?;
        let t = (self.iterations + 1) as i32;
        let (b1, b2) = (T::lit(self.beta1), T::lit(self.beta2));
        let lr = T::lit(self.learning_rate);
        let eps = T::lit(self.epsilon);
        let correction1 = T::one() - b1.powi(t);
        let correction2 = T::one() - b2.powi(t);
        for ((param, grad), first, second) in izip!(set.pairs(), &self.first, &self.second) {
            let g = grad.to_vec();
            let (mut m, mut v) = (first.to_vec(), second.to_vec());
            param.map_indexed_inplace(|i, p| {
                m[i] = b1 * m[i] + (T::one() - b1) * g[i];
                v[i] = b2 * v[i] + (T::one() - b2) * g[i] * g[i];
                let m_hat = (b1 * m[i] + (T::one() - b1) * g[i]) / correction1;
                let v_hat = v[i] / correction2;
                p - lr * m_hat / (v_hat.sqrt() + eps)
            });
            first.assign(&m)?;
            second.assign(&v)?;
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
fn test_nadam_first_step() {
    use crate::tensor::Tensor;

    let mut opt = Nadam::new(0.01, 0.9, 0.999, 1e-8).unwrap();
    let param = Tensor::from([1.0f64]);
    opt.construct(vec![param.clone()], vec![Tensor::from([2.0])])
        .unwrap();
    opt.update().unwrap();
    // m = 0.2, mh = (0.18 + 0.2) / 0.1 = 3.8, vh = 4
    let expected = 1.0 - 0.01 * 3.8 / (2.0 + 1e-8);
    assert!((param.get(&[0]).unwrap() - expected).abs() < 1e-12);
}
