use itertools::izip;

use crate::error::{Error, Result};
use crate::optim::{open_unit, positive, Optimizer, ParamSet};
use crate::tensor::{Float, TensorList};

/// Adam variant whose denominator uses the running maximum of the second
/// moment, so the effective step size never grows.
pub struct AmsGrad<T: Float> {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    set: Option<ParamSet<T>>,
    first: TensorList<T>,
    second: TensorList<T>,
    second_max: TensorList<T>,
    iterations: usize,
}

impl<T: Float> AmsGrad<T> {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Result<Self> {
        positive("learning rate", learning_rate)?;
        open_unit("beta1", beta1)?;
        open_unit("beta2", beta2)?;
        positive("epsilon", epsilon)?;
        Ok(AmsGrad {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            set: None,
            first: vec![],
            second: vec![],
            second_max: vec![],
            iterations: 0,
        })
    }
}

impl<T: Float> Default for AmsGrad<T> {
    fn default() -> Self {
        AmsGrad {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            set: None,
            first: vec![],
            second: vec![],
            second_max: vec![],
            iterations: 0,
        }
    }
}

impl<T: Float> Optimizer<T> for AmsGrad<T> {
    fn name(&self) -> &'static str {
        "AMSGrad"
    }

    fn construct(&mut self, params: TensorList<T>, grads: TensorList<T>) -> Result<()> {
        let set = ParamSet::new(self.name(), params, grads)?;
        self.first = set.state();
        self.second = set.state();
        self.second_max = set.state();
        self.set = Some(set);
        self.iterations = 0;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotConstructed("AMSGrad"))?;
        let t = (self.iterations + 1) as i32;
        let (b1, b2) = (T::lit(self.beta1), T::lit(self.beta2));
        let lr = T::lit(self.learning_rate);
        let eps = T::lit(self.epsilon);
        let correction1 = T::one() - b1.powi(t);
        let correction2 = T::one() - b2.powi(t);
        for ((param, grad), first, second, second_max) in izip!(
            set.pairs(),
            &self.first,
            &self.second,
            &self.second_max
        ) {
            let g = grad.to_vec();
            let (mut m, mut v, mut v_max) = (first.to_vec(), second.to_vec(), second_max.to_vec());
            param.map_indexed_inplace(|i, p| {
                m[i] = b1 * m[i] + (T::one() - b1) * g[i];
                v[i] = b2 * v[i] + (T::one() - b2) * g[i] * g[i];
                v_max[i] = v_max[i].max(v[i]);
                p - lr * (m[i] / correction1) / ((v_max[i] / correction2).sqrt() + eps)
            });
            first.assign(&m)?;
            second.assign(&v)?;
            second_max.assign(&v_max)?;
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
fn test_amsgrad_keeps_largest_second_moment() {
    use crate::tensor::Tensor;

    let mut opt = AmsGrad::default();
    let param = Tensor::from([0.0f64]);
    let grad = Tensor::from([10.0]);
    opt.construct(vec![param.clone()], vec![grad.clone()]).unwrap();
    opt.update().unwrap();
    grad.fill(0.001);
    opt.update().unwrap();
    assert_eq!(opt.second_max[0].shape(), &[1]);
    let peak = opt.second_max[0].item().unwrap();
    assert!(peak >= opt.second[0].item().unwrap());
    assert!((peak - 0.1).abs() < 1e-9);
}
