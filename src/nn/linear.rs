use log::debug;
use rand::rngs::StdRng;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::nn::init::Initializer;
use crate::nn::module::{batch_size, private, LayerKind, Module};
use crate::nn::Activation;
use crate::tensor::{Float, Tensor, TensorList};

/// Fully-connected layer: `y = activation(x · W + b)`.
///
/// The kernel has shape `[inputs, units]` and the bias `[units]`. The layer
/// accepts one sample `[inputs]` or a batch `[n, inputs]`.
pub struct Linear<T: Float> {
    units: usize,
    activation: Activation,
    use_bias: bool,
    kernel_init: Initializer,
    bias_init: Initializer,
    backend: Backend,
    /// weights supplied by the caller are never re-initialised
    preset: bool,
    input_shape: Option<Vec<usize>>,
    output_shape: Vec<usize>,
    pub weights: Tensor<T>,
    pub bias: Tensor<T>,
    weights_grad: Tensor<T>,
    bias_grad: Tensor<T>,
    cache: Option<Cache<T>>,
}

struct Cache<T: Float> {
    input: Tensor<T>,
    pre: Tensor<T>,
    out: Tensor<T>,
}

impl<T: Float> Linear<T> {
    pub fn new(units: usize, activation: Activation) -> Result<Self> {
        if units == 0 {
            return Err(Error::InvalidParameter(
                "a linear layer needs at least one unit".into(),
            ));
        }
        Ok(Linear {
            units,
            activation,
            use_bias: true,
            kernel_init: Initializer::GlorotUniform,
            bias_init: Initializer::Zeros,
            backend: Backend::default(),
            preset: false,
            input_shape: None,
            output_shape: vec![units],
            weights: Tensor::zeros(&[0, units]),
            bias: Tensor::zeros(&[units]),
            weights_grad: Tensor::zeros(&[0, units]),
            bias_grad: Tensor::zeros(&[units]),
            cache: None,
        })
    }

    /// A built layer around explicit weights `[inputs, units]` and bias `[units]`.
    pub fn from_weights(weights: Tensor<T>, bias: Tensor<T>, activation: Activation) -> Result<Self> {
        let (inputs, units) = match *weights.shape() {
            [inputs, units] if inputs > 0 && units > 0 => (inputs, units),
            _ => {
                return Err(Error::invalid_shape(
                    "linear weights",
                    weights.shape(),
                    "expected a non-empty [inputs, units] matrix",
                ))
            }
        };
        bias.expect_shape("linear bias", &[units])?;
        let mut layer = Linear::new(units, activation)?;
        layer.preset = true;
        layer.weights = weights.deep_clone();
        layer.bias = bias.deep_clone();
        layer.build(&[inputs])?;
        Ok(layer)
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn with_kernel_initializer(mut self, init: Initializer) -> Self {
        self.kernel_init = init;
        self
    }

    pub fn with_bias_initializer(mut self, init: Initializer) -> Self {
        self.bias_init = init;
        self
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn uses_bias(&self) -> bool {
        self.use_bias
    }

    fn inputs(&self) -> Result<usize> {
        match self.input_shape.as_deref() {
            Some(&[inputs]) => Ok(inputs),
            _ => Err(Error::NotBuilt("Linear")),
        }
    }
}

impl<T: Float> private::Private for Linear<T> {}

impl<T: Float> Module<T> for Linear<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        let inputs = match *input_shape {
            [inputs] if inputs > 0 => inputs,
            _ => {
                return Err(Error::invalid_shape(
                    "linear build",
                    input_shape,
                    "expected one positive dimension",
                ))
            }
        };
        if self.preset {
            self.weights
                .expect_shape("linear build", &[inputs, self.units])?;
        } else {
            self.weights = Tensor::zeros(&[inputs, self.units]);
            self.bias = Tensor::zeros(&[self.units]);
        }
        self.weights_grad = Tensor::zeros(&[inputs, self.units]);
        self.bias_grad = Tensor::zeros(&[self.units]);
        self.input_shape = Some(input_shape.to_vec());
        self.cache = None;
        debug!("built Linear {inputs} -> {}", self.units);
        Ok(())
    }

    fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    fn output_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_ref().map(|_| self.output_shape.as_slice())
    }

    fn initialize(&mut self, rng: &mut StdRng) -> Result<()> {
        if self.preset {
            return Ok(());
        }
        self.inputs()?;
        self.kernel_init.initialize(&self.weights, rng)?;
        if self.use_bias {
            self.bias_init.initialize(&self.bias, rng)?;
        }
        Ok(())
    }

    fn configure(&mut self, backend: Backend, _seed: u64) {
        self.backend = backend;
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        let inputs = self.inputs()?;
        let batch = batch_size("linear forward", &[inputs], x.shape())?;
        let pre = self.backend.matmul(x, &self.weights)?;
        if self.use_bias {
            match batch {
                None => pre.add_assign_tensor(&self.bias)?,
                Some(n) => {
                    for i in 0..n {
                        pre.sub_tensor(i)?.add_assign_tensor(&self.bias)?;
                    }
                }
            }
        }
        let out = self.activation.forward(&pre)?;
        self.cache = Some(Cache {
            input: x.clone(),
            pre,
            out: out.clone(),
        });
        Ok(out)
    }

    /// Accumulates `dW += xᵗ · g` and `db += Σ g`, returns `g · Wᵗ`, where `g`
    /// is the incoming gradient after the activation derivative.
    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        self.inputs()?;
        let cache = self.cache.as_ref().ok_or(Error::MissingForward("Linear"))?;
        grad.expect_shape("linear backward", cache.out.shape())?;
        let g = self.activation.backward(&cache.pre, &cache.out, grad)?;
        match cache.input.rank() {
            1 => {
                let column = cache.input.unsqueeze(1)?;
                let row = g.unsqueeze(0)?;
                self.backend.matmul_into(&column, &row, &self.weights_grad)?;
                if self.use_bias {
                    self.bias_grad.add_assign_tensor(&g)?;
                }
            }
            _ => {
                self.backend
                    .matmul_into(&cache.input.t()?, &g, &self.weights_grad)?;
                if self.use_bias {
                    self.bias_grad.add_assign_tensor(&g.sum_axis0()?)?;
                }
            }
        }
        self.backend.matmul(&g, &self.weights.t()?)
    }

    fn params(&self) -> TensorList<T> {
        if self.use_bias {
            vec![self.weights.clone(), self.bias.clone()]
        } else {
            vec![self.weights.clone()]
        }
    }

    fn grads(&self) -> TensorList<T> {
        if self.use_bias {
            vec![self.weights_grad.clone(), self.bias_grad.clone()]
        } else {
            vec![self.weights_grad.clone()]
        }
    }
}
