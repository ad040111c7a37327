use itertools::Itertools;
use log::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::nn::{
    Activation, ActivationLayer, Conv2d, Dropout, Flatten, GlobalAvgPool2d, Layer, Linear,
    Pool2d, Sequential,
};
use crate::tensor::Float;

/// Hyperparameters of one layer, detached from its tensors.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerConfig {
    Linear {
        units: usize,
        activation: Activation,
        use_bias: bool,
    },
    Conv2d {
        filters: usize,
        filter: [usize; 2],
        activation: Activation,
        use_bias: bool,
    },
    MaxPool2d {
        filter: (usize, usize),
        stride: (usize, usize),
    },
    AvgPool2d {
        filter: (usize, usize),
        stride: (usize, usize),
    },
    GlobalAvgPool2d,
    Activation(Activation),
    Dropout {
        rate: f64,
        seed: Option<u64>,
    },
    Flatten,
}

impl LayerConfig {
    pub fn of<T: Float>(layer: &Layer<T>) -> LayerConfig {
        match layer {
            Layer::Linear(layer) => LayerConfig::Linear {
                units: layer.units(),
                activation: layer.activation(),
                use_bias: layer.uses_bias(),
            },
            Layer::Conv2d(layer) => LayerConfig::Conv2d {
                filters: layer.filters(),
                filter: layer.filter(),
                activation: layer.activation(),
                use_bias: layer.uses_bias(),
            },
            Layer::MaxPool2d(layer) => LayerConfig::MaxPool2d {
                filter: layer.filter(),
                stride: layer.stride(),
            },
            Layer::AvgPool2d(layer) => LayerConfig::AvgPool2d {
                filter: layer.filter(),
                stride: layer.stride(),
            },
            Layer::GlobalAvgPool2d(_) => LayerConfig::GlobalAvgPool2d,
            Layer::Activation(layer) => LayerConfig::Activation(layer.activation()),
            Layer::Dropout(layer) => LayerConfig::Dropout {
                rate: layer.rate(),
                seed: layer.seed(),
            },
            Layer::Flatten(_) => LayerConfig::Flatten,
        }
    }

    /// A fresh, unbuilt layer with these hyperparameters.
    pub fn instantiate<T: Float>(&self) -> Result<Layer<T>> {
        let layer = match *self {
            LayerConfig::Linear {
                units,
                activation,
                use_bias,
            } => Linear::new(units, activation)?.with_bias(use_bias).into(),
            LayerConfig::Conv2d {
                filters,
                filter,
                activation,
                use_bias,
            } => Conv2d::new(filters, &filter, activation)?
                .with_bias(use_bias)
                .into(),
            LayerConfig::MaxPool2d { filter, stride } => Pool2d::max_with_stride(filter, stride)?.into(),
            LayerConfig::AvgPool2d { filter, stride } => {
                Pool2d::average_with_stride(filter, stride)?.into()
            }
            LayerConfig::GlobalAvgPool2d => GlobalAvgPool2d::new().into(),
            LayerConfig::Activation(activation) => ActivationLayer::new(activation).into(),
            LayerConfig::Dropout { rate, seed } => {
                let dropout = Dropout::new(rate)?;
                match seed {
                    Some(seed) => dropout.with_seed(seed).into(),
                    None => dropout.into(),
                }
            }
            LayerConfig::Flatten => Flatten::new().into(),
        };
        Ok(layer)
    }
}

/// A deep, thread-movable copy of a compiled model: layer hyperparameters
/// plus the raw parameter values in [`Sequential::params`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot<T: Float> {
    pub name: String,
    pub input_shape: Vec<usize>,
    pub layers: Vec<LayerConfig>,
    pub params: Vec<Vec<T>>,
    pub loss: Loss,
}

impl<T: Float> ModelSnapshot<T> {
    pub(crate) fn capture(model: &Sequential<T>, input_shape: Vec<usize>) -> Result<Self> {
        Ok(ModelSnapshot {
            name: model.name().to_string(),
            input_shape,
            layers: model.layers().iter().map(LayerConfig::of).collect(),
            params: model.params().iter().map(|param| param.to_vec()).collect(),
            loss: model.loss(),
        })
    }

    /// Rebuilds an independent model for inference. The result has no
    /// optimizer, so it can run `forward` and `backward` but not `update`.
    pub fn restore(&self, config: Config) -> Result<Sequential<T>> {
        let mut model = Sequential::new()
            .with_config(config)
            .with_name(self.name.clone());
        for layer_config in &self.layers {
            model.add(layer_config.instantiate()?)?;
        }
        model.assemble(&self.input_shape)?;
        let params = model.params();
        if params.len() != self.params.len() {
            return Err(Error::LengthMismatch {
                context: "snapshot parameters",
                expected: params.len(),
                actual: self.params.len(),
            });
        }
        for (param, values) in params.iter().zip_eq(&self.params) {
            param.assign(values)?;
        }
        model.set_loss(self.loss);
        debug!("restored {} with {} parameter tensors", self.name, params.len());
        Ok(model)
    }

    pub fn param_count(&self) -> usize {
        self.params.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Sgd;
    use crate::tensor::Tensor;

    #[test]
    fn test_restore_is_an_independent_copy() {
        let mut model = Sequential::<f64>::new();
        model.add(Conv2d::new(2, &[2, 2], Activation::ReLU).unwrap()).unwrap();
        model.add(Pool2d::max((2, 2)).unwrap()).unwrap();
        model.add(Flatten::new()).unwrap();
        model.add(Linear::new(3, Activation::Softmax).unwrap()).unwrap();
        model
            .compile(Sgd::default(), Loss::CrossEntropy, &[1, 5, 5])
            .unwrap();
        let snapshot = model.snapshot().unwrap();
        assert_eq!(snapshot.param_count(), model.param_count());

        let mut copy = snapshot.restore(Config::default().with_seed(99)).unwrap();
        let x = Tensor::new((0..25).map(|v| f64::from(v) / 25.0).collect(), vec![1, 5, 5]).unwrap();
        assert_eq!(copy.forward(&x).unwrap(), model.forward(&x).unwrap());

        model.params()[0].fill(0.0);
        assert_ne!(copy.params()[0].to_vec(), model.params()[0].to_vec());
        assert_eq!(copy.optimizer_name(), None);
        assert_eq!(copy.update().unwrap_err(), Error::NotCompiled);
    }

    #[test]
    fn test_layer_configs_round_trip() {
        let configs = vec![
            LayerConfig::Dropout {
                rate: 0.2,
                seed: Some(3),
            },
            LayerConfig::AvgPool2d {
                filter: (2, 2),
                stride: (1, 1),
            },
            LayerConfig::Activation(Activation::GELU),
        ];
        for layer_config in configs {
            let layer: Layer<f32> = layer_config.instantiate().unwrap();
            assert_eq!(LayerConfig::of(&layer), layer_config);
        }
    }
}
