use std::fmt::Write as _;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::nn::module::Module;
use crate::nn::{Layer, ModelSnapshot};
use crate::optim::Optimizer;
use crate::tensor::{Float, Tensor, TensorList};

/// An ordered pipeline of layers, each fed the previous one's output.
///
/// Layers are appended while the model is open. [`Sequential::compile`] then
/// builds every layer from the output shape of its predecessor, draws initial
/// parameters and binds the optimizer to the flattened parameters and
/// gradients. After that the layer list is frozen.
///
/// ```
/// # use light_nn::nn::*;
/// # use light_nn::optim::Sgd;
/// # use light_nn::loss::Loss;
/// # use light_nn::tensor::*;
/// let mut model = Sequential::<f64>::new();
/// model.add(Linear::new(3, Activation::Tanh).unwrap()).unwrap();
/// model.add(Linear::new(1, Activation::Sigmoid).unwrap()).unwrap();
/// model.compile(Sgd::default(), Loss::MeanSquaredError, &[2]).unwrap();
/// assert_eq!(model.param_count(), 13);
/// let y = model.forward(&Tensor::from([0.5, -0.5])).unwrap();
/// assert_eq!(y.shape(), &[1]);
/// ```
pub struct Sequential<T: Float> {
    name: String,
    layers: Vec<Layer<T>>,
    config: Config,
    optimizer: Option<Box<dyn Optimizer<T>>>,
    loss: Loss,
    input_shape: Option<Vec<usize>>,
    compiled: bool,
    training: bool,
}

impl<T: Float> Default for Sequential<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> Sequential<T> {
    pub fn new() -> Self {
        Sequential {
            name: "sequential".to_string(),
            layers: vec![],
            config: Config::default(),
            optimizer: None,
            loss: Loss::default(),
            input_shape: None,
            compiled: false,
            training: false,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.config.backend
    }

    pub fn add(&mut self, layer: impl Into<Layer<T>>) -> Result<()> {
        if self.compiled {
            return Err(Error::AlreadyCompiled);
        }
        self.layers.push(layer.into());
        Ok(())
    }

    /// Removes the last layer of an uncompiled model.
    pub fn pop(&mut self) -> Result<Option<Layer<T>>> {
        if self.compiled {
            return Err(Error::AlreadyCompiled);
        }
        Ok(self.layers.pop())
    }

    /// Builds and initialises every layer for per-sample `input_shape`, then
    /// binds `optimizer` to the model's parameters.
    pub fn compile(
        &mut self,
        optimizer: impl Optimizer<T> + 'static,
        loss: Loss,
        input_shape: &[usize],
    ) -> Result<()> {
        let mut optimizer: Box<dyn Optimizer<T>> = Box::new(optimizer);
        self.assemble(input_shape)?;
        if let Err(err) = optimizer.construct(self.params(), self.grads()) {
            self.compiled = false;
            self.input_shape = None;
            return Err(err);
        }
        debug!(
            "compiled {} with {} and {loss} loss, {} parameters",
            self.name,
            optimizer.name(),
            self.param_count()
        );
        self.optimizer = Some(optimizer);
        self.loss = loss;
        Ok(())
    }

    /// Builds the layers without an optimizer. Such a model can run
    /// `forward`/`backward` but not `update`.
    pub(crate) fn assemble(&mut self, input_shape: &[usize]) -> Result<()> {
        if self.compiled {
            return Err(Error::AlreadyCompiled);
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidParameter(
                "a model needs at least one layer".into(),
            ));
        }
        let config = self.config.resolve()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut shape = input_shape.to_vec();
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.configure(config.backend, config.seed.wrapping_add(i as u64 + 1));
            layer.build(&shape)?;
            layer.initialize(&mut rng)?;
            shape = layer
                .output_shape()
                .ok_or(Error::NotBuilt("layer"))?
                .to_vec();
        }
        self.input_shape = Some(input_shape.to_vec());
        self.compiled = true;
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    fn ensure_compiled(&self) -> Result<()> {
        if self.compiled {
            Ok(())
        } else {
            Err(Error::NotCompiled)
        }
    }

    pub fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        self.ensure_compiled()?;
        let mut out = x.clone();
        for layer in self.layers.iter_mut() {
            out = layer.forward(&out)?;
        }
        Ok(out)
    }

    /// Propagates the loss gradient through the layers in reverse order,
    /// accumulating parameter gradients. Returns the gradient for the input.
    pub fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        self.ensure_compiled()?;
        let mut grad = grad.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(grad)
    }

    pub fn zero_grad(&self) {
        for layer in &self.layers {
            layer.zero_grad();
        }
    }

    /// One optimizer step over the accumulated gradients.
    pub fn update(&mut self) -> Result<()> {
        match self.optimizer.as_mut() {
            Some(optimizer) => optimizer.update(),
            None => Err(Error::NotCompiled),
        }
    }

    /// `zero_grad`, forward, loss, backward and update on one sample or batch.
    pub fn train_on_batch(&mut self, x: &Tensor<T>, y: &Tensor<T>) -> Result<T> {
        self.zero_grad();
        let pred = self.forward(x)?;
        let loss = self.loss.forward(&pred, y)?;
        let grad = self.loss.backward(&pred, y)?;
        self.backward(&grad)?;
        self.update()?;
        Ok(loss)
    }

    /// Loss of the current parameters on one sample or batch.
    pub fn evaluate(&mut self, x: &Tensor<T>, y: &Tensor<T>) -> Result<T> {
        let pred = self.forward(x)?;
        self.loss.forward(&pred, y)
    }

    pub fn predict(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        self.forward(x)
    }

    pub fn params(&self) -> TensorList<T> {
        self.layers.iter().flat_map(|layer| layer.params()).collect()
    }

    pub fn grads(&self) -> TensorList<T> {
        self.layers.iter().flat_map(|layer| layer.grads()).collect()
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        for layer in self.layers.iter_mut() {
            layer.set_training(training);
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn layers(&self) -> &[Layer<T>] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Result<&Layer<T>> {
        self.layers.get(index).ok_or_else(|| Error::IndexOutOfBounds {
            index: vec![index],
            shape: vec![self.layers.len()],
        })
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn param_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.param_count()).sum()
    }

    pub fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    pub fn output_shape(&self) -> Option<&[usize]> {
        self.layers.last().and_then(|layer| layer.output_shape())
    }

    pub fn optimizer_name(&self) -> Option<&'static str> {
        self.optimizer.as_ref().map(|optimizer| optimizer.name())
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub(crate) fn set_loss(&mut self, loss: Loss) {
        self.loss = loss;
    }

    /// Layer table with output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Model: {}", self.name);
        let _ = writeln!(out, "{:<4} {:<16} {:<18} {:>10}", "#", "layer", "output", "params");
        for (i, layer) in self.layers.iter().enumerate() {
            let shape = layer
                .output_shape()
                .map(|shape| format!("{shape:?}"))
                .unwrap_or_else(|| "?".to_string());
            let _ = writeln!(
                out,
                "{:<4} {:<16} {:<18} {:>10}",
                i,
                layer.kind().to_string(),
                shape,
                layer.param_count()
            );
        }
        let _ = writeln!(out, "total parameters: {}", self.param_count());
        if let Some(name) = self.optimizer_name() {
            let _ = writeln!(out, "optimizer: {name}, loss: {}", self.loss);
        }
        out
    }

    /// Detached copy of the layer configuration and parameter values.
    pub fn snapshot(&self) -> Result<ModelSnapshot<T>> {
        self.ensure_compiled()?;
        let input_shape = self.input_shape.clone().ok_or(Error::NotCompiled)?;
        ModelSnapshot::capture(self, input_shape)
    }
}
