use std::fmt;

use rand::rngs::StdRng;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::tensor::{Float, Tensor, TensorList};

pub(crate) mod private {
    pub trait Private {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Linear,
    Conv2d,
    MaxPool2d,
    AvgPool2d,
    GlobalAvgPool2d,
    Activation,
    Dropout,
    Flatten,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Linear => "Linear",
            LayerKind::Conv2d => "Conv2d",
            LayerKind::MaxPool2d => "MaxPool2d",
            LayerKind::AvgPool2d => "AvgPool2d",
            LayerKind::GlobalAvgPool2d => "GlobalAvgPool2d",
            LayerKind::Activation => "Activation",
            LayerKind::Dropout => "Dropout",
            LayerKind::Flatten => "Flatten",
        };
        write!(f, "{name}")
    }
}

/// The capability set shared by every layer.
///
/// A layer is built once for a fixed per-sample input shape. Afterwards
/// `forward` accepts either one sample of exactly that shape or a batch with an
/// extra leading axis, and `backward` takes the gradient of the most recent
/// `forward` output. Parameter gradients accumulate across `backward` calls
/// until [`Module::zero_grad`].
pub trait Module<T: Float>: private::Private {
    fn kind(&self) -> LayerKind;

    /// Fixes shapes and allocates parameters and gradients.
    fn build(&mut self, input_shape: &[usize]) -> Result<()>;

    fn input_shape(&self) -> Option<&[usize]>;

    fn output_shape(&self) -> Option<&[usize]>;

    fn is_built(&self) -> bool {
        self.input_shape().is_some()
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>>;

    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>>;

    fn params(&self) -> TensorList<T>;

    /// One gradient per entry of [`Module::params`], shaped like it.
    fn grads(&self) -> TensorList<T>;

    fn zero_grad(&self) {
        for grad in self.grads() {
            grad.zero();
        }
    }

    /// Draws initial parameter values. Layers given explicit weights keep them.
    fn initialize(&mut self, _rng: &mut StdRng) -> Result<()> {
        Ok(())
    }

    /// Binds the kernel backend and a seed for layer-local randomness.
    fn configure(&mut self, _backend: Backend, _seed: u64) {}

    fn set_training(&mut self, _training: bool) {}

    fn param_count(&self) -> usize {
        self.params().iter().map(|param| param.len()).sum()
    }
}

/// Checks `actual` against a layer built for `built`. Returns `None` for one
/// sample and `Some(n)` for a batch of `n`.
pub(crate) fn batch_size(
    context: &'static str,
    built: &[usize],
    actual: &[usize],
) -> Result<Option<usize>> {
    if actual == built {
        return Ok(None);
    }
    if actual.len() == built.len() + 1 && actual[1..] == *built && actual[0] > 0 {
        return Ok(Some(actual[0]));
    }
    Err(Error::shape_mismatch(context, built, actual))
}

/// Output shape of a layer for an input that may carry a batch axis.
pub(crate) fn with_batch(batch: Option<usize>, shape: &[usize]) -> Vec<usize> {
    match batch {
        Some(n) => std::iter::once(n).chain(shape.iter().copied()).collect(),
        None => shape.to_vec(),
    }
}

pub(crate) fn positive_shape(context: &'static str, shape: &[usize]) -> Result<()> {
    if shape.is_empty() || shape.contains(&0) {
        return Err(Error::invalid_shape(
            context,
            shape,
            "dimensions must be positive",
        ));
    }
    Ok(())
}

#[test]
fn test_batch_size() {
    assert_eq!(batch_size("t", &[3], &[3]).unwrap(), None);
    assert_eq!(batch_size("t", &[3], &[5, 3]).unwrap(), Some(5));
    assert!(batch_size("t", &[3], &[3, 5]).is_err());
    assert!(batch_size("t", &[2, 2], &[4]).is_err());
    assert_eq!(with_batch(Some(2), &[4, 4]), vec![2, 4, 4]);
}
