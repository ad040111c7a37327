use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::nn::module::{batch_size, positive_shape, private, LayerKind, Module};
use crate::tensor::{Float, Tensor, TensorList};

/// Inverted dropout. While training, each element survives with probability
/// `1 - rate` and is scaled by `1 / (1 - rate)`. Outside training the layer is
/// the identity.
pub struct Dropout<T: Float> {
    rate: f64,
    seed: Option<u64>,
    rng: StdRng,
    training: bool,
    shape: Option<Vec<usize>>,
    last_shape: Option<Vec<usize>>,
    mask: Option<Tensor<T>>,
}

impl<T: Float> Dropout<T> {
    pub fn new(rate: f64) -> Result<Self> {
        if !(rate > 0.0 && rate < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "dropout rate must lie in (0, 1), got {rate}"
            )));
        }
        Ok(Dropout {
            rate,
            seed: None,
            rng: StdRng::seed_from_u64(0),
            training: false,
            shape: None,
            last_shape: None,
            mask: None,
        })
    }

    /// Pins the mask generator, overriding the model seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl<T: Float> private::Private for Dropout<T> {}

impl<T: Float> Module<T> for Dropout<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::Dropout
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        positive_shape("dropout build", input_shape)?;
        self.shape = Some(input_shape.to_vec());
        self.last_shape = None;
        self.mask = None;
        debug!("built Dropout({}) over {:?}", self.rate, input_shape);
        Ok(())
    }

    fn input_shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    fn output_shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    fn configure(&mut self, _backend: Backend, seed: u64) {
        if self.seed.is_none() {
            self.rng = StdRng::seed_from_u64(seed);
        }
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        let shape = self.shape.as_deref().ok_or(Error::NotBuilt("Dropout"))?;
        batch_size("dropout forward", shape, x.shape())?;
        self.last_shape = Some(x.shape().to_vec());
        if !self.training {
            self.mask = None;
            return Ok(x.deep_clone());
        }
        let keep = T::lit(1.0 / (1.0 - self.rate));
        let rate = self.rate;
        let rng = &mut self.rng;
        let mask = Tensor::zeros(x.shape());
        mask.map_inplace_with(|| {
            if rng.gen::<f64>() >= rate {
                keep
            } else {
                T::zero()
            }
        });
        let out = x.mul(&mask)?;
        self.mask = Some(mask);
        Ok(out)
    }

    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        if self.shape.is_none() {
            return Err(Error::NotBuilt("Dropout"));
        }
        let last = self.last_shape.as_deref().ok_or(Error::MissingForward("Dropout"))?;
        grad.expect_shape("dropout backward", last)?;
        match &self.mask {
            Some(mask) => grad.mul(mask),
            None => Ok(grad.deep_clone()),
        }
    }

    fn params(&self) -> TensorList<T> {
        vec![]
    }

    fn grads(&self) -> TensorList<T> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_is_identity() {
        let mut layer = Dropout::<f64>::new(0.5).unwrap();
        layer.build(&[4]).unwrap();
        let x = Tensor::from([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(layer.forward(&x).unwrap(), x);
        assert_eq!(layer.backward(&x).unwrap(), x);
    }

    #[test]
    fn test_training_mask_is_reused_in_backward() {
        let mut layer = Dropout::<f64>::new(0.25).unwrap().with_seed(11);
        layer.build(&[1000]).unwrap();
        layer.set_training(true);
        let x = Tensor::new_with_filler(vec![1000], 1.0);
        let y = layer.forward(&x).unwrap();
        let kept = y.to_vec().iter().filter(|v| **v != 0.0).count();
        assert!(kept > 650 && kept < 850, "kept {kept}");
        assert!(y
            .to_vec()
            .iter()
            .all(|v| *v == 0.0 || (v - 1.0 / 0.75).abs() < 1e-12));
        let g = layer.backward(&x).unwrap();
        assert_eq!(g, y);
    }

    #[test]
    fn test_backward_checks_gradient_shape() {
        let mut layer = Dropout::<f64>::new(0.5).unwrap();
        layer.build(&[4]).unwrap();
        assert!(layer.backward(&Tensor::zeros(&[4])).is_err());
        layer.forward(&Tensor::zeros(&[4])).unwrap();
        assert!(layer.backward(&Tensor::zeros(&[7, 9])).is_err());
        assert!(layer.backward(&Tensor::zeros(&[2, 4])).is_err());

        layer.set_training(true);
        layer.forward(&Tensor::zeros(&[3, 4])).unwrap();
        assert!(layer.backward(&Tensor::zeros(&[4])).is_err());
        assert!(layer.backward(&Tensor::zeros(&[3, 4])).is_ok());
    }

    #[test]
    fn test_rate_bounds() {
        assert!(Dropout::<f32>::new(0.0).is_err());
        assert!(Dropout::<f32>::new(1.0).is_err());
        assert!(Dropout::<f32>::new(f64::NAN).is_err());
    }
}
