use crate::error::{Error, Result};
use crate::nn::module::{batch_size, positive_shape, private, with_batch, LayerKind, Module};
use crate::tensor::{Float, Tensor, TensorList};

/// Collapses each sample into one axis.
pub struct Flatten<T: Float> {
    input_shape: Option<Vec<usize>>,
    output_shape: Vec<usize>,
    input: Option<Tensor<T>>,
}

impl<T: Float> Flatten<T> {
    pub fn new() -> Self {
        Flatten {
            input_shape: None,
            output_shape: vec![],
            input: None,
        }
    }
}

impl<T: Float> Default for Flatten<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> private::Private for Flatten<T> {}

impl<T: Float> Module<T> for Flatten<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::Flatten
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        positive_shape("flatten build", input_shape)?;
        self.output_shape = vec![input_shape.iter().product()];
        self.input_shape = Some(input_shape.to_vec());
        self.input = None;
        Ok(())
    }

    fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    fn output_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_ref().map(|_| self.output_shape.as_slice())
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        let built = self.input_shape.as_deref().ok_or(Error::NotBuilt("Flatten"))?;
        let batch = batch_size("flatten forward", built, x.shape())?;
        let shape = with_batch(batch, &self.output_shape);
        self.input = Some(x.clone());
        x.contiguous().reshape(shape)
    }

    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        let x = self.input.as_ref().ok_or(Error::MissingForward("Flatten"))?;
        let built = self.input_shape.as_deref().ok_or(Error::NotBuilt("Flatten"))?;
        let batch = batch_size("flatten backward", built, x.shape())?;
        grad.expect_shape("flatten backward", &with_batch(batch, &self.output_shape))?;
        grad.contiguous().reshape(x.shape().to_vec())
    }

    fn params(&self) -> TensorList<T> {
        vec![]
    }

    fn grads(&self) -> TensorList<T> {
        vec![]
    }
}

#[test]
fn test_flatten_round_trip() {
    let mut layer = Flatten::<f64>::new();
    layer.build(&[2, 2, 3]).unwrap();
    assert_eq!(Module::<f64>::output_shape(&layer), Some(&[12][..]));
    let batch = Tensor::new((0..24).map(f64::from).collect(), vec![2, 2, 2, 3]).unwrap();
    let flat = layer.forward(&batch).unwrap();
    assert_eq!(flat.shape(), &[2, 12]);
    let back = layer.backward(&flat).unwrap();
    assert_eq!(back, batch);
    assert!(layer.forward(&Tensor::zeros(&[12])).is_err());
}

#[test]
fn test_flatten_backward_rejects_reordered_gradient() {
    let mut layer = Flatten::<f64>::new();
    layer.build(&[2, 3]).unwrap();
    layer.forward(&Tensor::zeros(&[2, 3])).unwrap();
    // Same element count, wrong shape.
    assert!(layer.backward(&Tensor::zeros(&[3, 2])).is_err());
    assert!(layer.backward(&Tensor::zeros(&[1, 6])).is_err());
    assert_eq!(layer.backward(&Tensor::zeros(&[6])).unwrap().shape(), &[2, 3]);
}
