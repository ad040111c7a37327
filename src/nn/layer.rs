use rand::rngs::StdRng;

use crate::backend::Backend;
use crate::error::Result;
use crate::nn::module::{private, LayerKind, Module};
use crate::nn::{ActivationLayer, Conv2d, Dropout, Flatten, GlobalAvgPool2d, Linear, Pool2d, PoolMode};
use crate::tensor::{Float, Tensor, TensorList};

/// Every layer type a [`Sequential`](crate::nn::Sequential) can hold.
pub enum Layer<T: Float> {
    Linear(Linear<T>),
    Conv2d(Conv2d<T>),
    MaxPool2d(Pool2d<T>),
    AvgPool2d(Pool2d<T>),
    GlobalAvgPool2d(GlobalAvgPool2d<T>),
    Activation(ActivationLayer<T>),
    Dropout(Dropout<T>),
    Flatten(Flatten<T>),
}

macro_rules! dispatch {
    ($layer:expr, $inner:ident => $body:expr) => {
        match $layer {
            Layer::Linear($inner) => $body,
            Layer::Conv2d($inner) => $body,
            Layer::MaxPool2d($inner) => $body,
            Layer::AvgPool2d($inner) => $body,
            Layer::GlobalAvgPool2d($inner) => $body,
            Layer::Activation($inner) => $body,
            Layer::Dropout($inner) => $body,
            Layer::Flatten($inner) => $body,
        }
    };
}

impl<T: Float> private::Private for Layer<T> {}

impl<T: Float> Module<T> for Layer<T> {
    fn kind(&self) -> LayerKind {
        dispatch!(self, layer => layer.kind())
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        dispatch!(self, layer => layer.build(input_shape))
    }

    fn input_shape(&self) -> Option<&[usize]> {
        dispatch!(self, layer => layer.input_shape())
    }

    fn output_shape(&self) -> Option<&[usize]> {
        dispatch!(self, layer => layer.output_shape())
    }

    fn is_built(&self) -> bool {
        dispatch!(self, layer => layer.is_built())
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        dispatch!(self, layer => layer.forward(x))
    }

    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        dispatch!(self, layer => layer.backward(grad))
    }

    fn params(&self) -> TensorList<T> {
        dispatch!(self, layer => layer.params())
    }

    fn grads(&self) -> TensorList<T> {
        dispatch!(self, layer => layer.grads())
    }

    fn zero_grad(&self) {
        dispatch!(self, layer => layer.zero_grad())
    }

    fn initialize(&mut self, rng: &mut StdRng) -> Result<()> {
        dispatch!(self, layer => layer.initialize(rng))
    }

    fn configure(&mut self, backend: Backend, seed: u64) {
        dispatch!(self, layer => layer.configure(backend, seed))
    }

    fn set_training(&mut self, training: bool) {
        dispatch!(self, layer => layer.set_training(training))
    }

    fn param_count(&self) -> usize {
        dispatch!(self, layer => layer.param_count())
    }
}

impl<T: Float> From<Linear<T>> for Layer<T> {
    fn from(layer: Linear<T>) -> Self {
        Layer::Linear(layer)
    }
}

impl<T: Float> From<Conv2d<T>> for Layer<T> {
    fn from(layer: Conv2d<T>) -> Self {
        Layer::Conv2d(layer)
    }
}

impl<T: Float> From<Pool2d<T>> for Layer<T> {
    fn from(layer: Pool2d<T>) -> Self {
        match layer.mode() {
            PoolMode::Max => Layer::MaxPool2d(layer),
            PoolMode::Average => Layer::AvgPool2d(layer),
        }
    }
}

impl<T: Float> From<GlobalAvgPool2d<T>> for Layer<T> {
    fn from(layer: GlobalAvgPool2d<T>) -> Self {
        Layer::GlobalAvgPool2d(layer)
    }
}

impl<T: Float> From<ActivationLayer<T>> for Layer<T> {
    fn from(layer: ActivationLayer<T>) -> Self {
        Layer::Activation(layer)
    }
}

impl<T: Float> From<Dropout<T>> for Layer<T> {
    fn from(layer: Dropout<T>) -> Self {
        Layer::Dropout(layer)
    }
}

impl<T: Float> From<Flatten<T>> for Layer<T> {
    fn from(layer: Flatten<T>) -> Self {
        Layer::Flatten(layer)
    }
}

#[test]
fn test_pool_mode_picks_variant() {
    let max: Layer<f32> = Pool2d::max((2, 2)).unwrap().into();
    let avg: Layer<f32> = Pool2d::average((2, 2)).unwrap().into();
    assert_eq!(max.kind(), LayerKind::MaxPool2d);
    assert_eq!(avg.kind(), LayerKind::AvgPool2d);
    assert_eq!(avg.param_count(), 0);
}
