use log::debug;
use rand::rngs::StdRng;

use crate::backend::{corr_output_shape, Backend};
use crate::error::{Error, Result};
use crate::nn::init::Initializer;
use crate::nn::module::{batch_size, private, with_batch, LayerKind, Module};
use crate::nn::Activation;
use crate::tensor::{Float, Tensor, TensorList};

/// Valid 2-D convolution layer (stride 1, no padding).
///
/// Input `[channels, h, w]` or `[n, channels, h, w]`; kernel
/// `[filters, channels, kh, kw]`; bias `[filters]`; output
/// `[filters, h - kh + 1, w - kw + 1]`.
pub struct Conv2d<T: Float> {
    filters: usize,
    filter: [usize; 2],
    activation: Activation,
    use_bias: bool,
    kernel_init: Initializer,
    bias_init: Initializer,
    backend: Backend,
    preset: bool,
    input_shape: Option<Vec<usize>>,
    output_shape: Vec<usize>,
    pub kernel: Tensor<T>,
    pub bias: Tensor<T>,
    kernel_grad: Tensor<T>,
    bias_grad: Tensor<T>,
    cache: Option<Cache<T>>,
}

struct Cache<T: Float> {
    input: Tensor<T>,
    pre: Tensor<T>,
    out: Tensor<T>,
}

impl<T: Float> Conv2d<T> {
    pub fn new(filters: usize, filter: &[usize], activation: Activation) -> Result<Self> {
        let filter = match *filter {
            [kh, kw] if kh > 0 && kw > 0 => [kh, kw],
            _ => {
                return Err(Error::invalid_shape(
                    "conv2d filter",
                    filter,
                    "expected two positive dimensions",
                ))
            }
        };
        if filters == 0 {
            return Err(Error::InvalidParameter(
                "a convolution needs at least one filter".into(),
            ));
        }
        if !activation.supports_spatial() {
            return Err(Error::Unsupported(format!(
                "{} cannot be fused into a convolution",
                activation.name()
            )));
        }
        Ok(Conv2d {
            filters,
            filter,
            activation,
            use_bias: true,
            kernel_init: Initializer::GlorotUniform,
            bias_init: Initializer::Zeros,
            backend: Backend::default(),
            preset: false,
            input_shape: None,
            output_shape: vec![],
            kernel: Tensor::zeros(&[filters, 0, filter[0], filter[1]]),
            bias: Tensor::zeros(&[filters]),
            kernel_grad: Tensor::zeros(&[filters, 0, filter[0], filter[1]]),
            bias_grad: Tensor::zeros(&[filters]),
            cache: None,
        })
    }

    /// Uses `kernel` (`[filters, channels, kh, kw]`) and `bias` instead of drawn
    /// values. The layer still needs `build` for its spatial input size.
    pub fn with_weights(mut self, kernel: Tensor<T>, bias: Tensor<T>) -> Result<Self> {
        let channels = match *kernel.shape() {
            [_, channels, _, _] if channels > 0 => channels,
            _ => {
                return Err(Error::invalid_shape(
                    "conv2d kernel",
                    kernel.shape(),
                    "expected [filters, channels, kh, kw]",
                ))
            }
        };
        kernel.expect_shape(
            "conv2d kernel",
            &[self.filters, channels, self.filter[0], self.filter[1]],
        )?;
        bias.expect_shape("conv2d bias", &[self.filters])?;
        self.kernel = kernel.deep_clone();
        self.bias = bias.deep_clone();
        self.preset = true;
        Ok(self)
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

    pub fn filters(&self) -> usize {
        self.filters
    }

    pub fn filter(&self) -> [usize; 2] {
        self.filter
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn uses_bias(&self) -> bool {
        self.use_bias
    }

    fn channels(&self) -> Result<usize> {
        match self.input_shape.as_deref() {
            Some(&[channels, _, _]) => Ok(channels),
            _ => Err(Error::NotBuilt("Conv2d")),
        }
    }

    /// `out[f] += Σ_c corr2d(x[c], K[f][c])` for one sample.
    fn forward_sample(&self, x: &Tensor<T>, out: &Tensor<T>) -> Result<()> {
        let channels = self.channels()?;
        for f in 0..self.filters {
            let plane = out.sub_tensor(f)?;
            let kernels = self.kernel.sub_tensor(f)?;
            for c in 0..channels {
                self.backend
                    .corr2d_into(&x.sub_tensor(c)?, &kernels.sub_tensor(c)?, &plane)?;
            }
            if self.use_bias {
                let b = self.bias.get(&[f])?;
                plane.map_inplace(|v| v + b);
            }
        }
        Ok(())
    }

    fn backward_sample(&self, x: &Tensor<T>, g: &Tensor<T>, dx: &Tensor<T>) -> Result<()> {
        let channels = self.channels()?;
        for f in 0..self.filters {
            let g_f = g.sub_tensor(f)?;
            if self.use_bias {
                let current = self.bias_grad.get(&[f])?;
                self.bias_grad.set(&[f], current + g_f.sum())?;
            }
            let kernels = self.kernel.sub_tensor(f)?;
            let kernel_grads = self.kernel_grad.sub_tensor(f)?;
            for c in 0..channels {
                self.backend
                    .corr2d_into(&x.sub_tensor(c)?, &g_f, &kernel_grads.sub_tensor(c)?)?;
                self.backend
                    .conv2d_full_into(&g_f, &kernels.sub_tensor(c)?, &dx.sub_tensor(c)?)?;
            }
        }
        Ok(())
    }
}

impl<T: Float> private::Private for Conv2d<T> {}

impl<T: Float> Module<T> for Conv2d<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv2d
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        let (channels, h, w) = match *input_shape {
            [c, h, w] if c > 0 && h > 0 && w > 0 => (c, h, w),
            _ => {
                return Err(Error::invalid_shape(
                    "conv2d build",
                    input_shape,
                    "expected positive [channels, height, width]",
                ))
            }
        };
        let [oh, ow] = corr_output_shape(&[h, w], &self.filter)?;
        let kernel_shape = [self.filters, channels, self.filter[0], self.filter[1]];
        if self.preset {
            self.kernel.expect_shape("conv2d build", &kernel_shape)?;
        } else {
            self.kernel = Tensor::zeros(&kernel_shape);
            self.bias = Tensor::zeros(&[self.filters]);
        }
        self.kernel_grad = Tensor::zeros(&kernel_shape);
        self.bias_grad = Tensor::zeros(&[self.filters]);
        self.output_shape = vec![self.filters, oh, ow];
        self.input_shape = Some(input_shape.to_vec());
        self.cache = None;
        debug!(
            "built Conv2d {:?} -> {:?} with {} {}x{} filters",
            input_shape, self.output_shape, self.filters, self.filter[0], self.filter[1]
        );
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
        self.channels()?;
        self.kernel_init.initialize(&self.kernel, rng)?;
        if self.use_bias {
            self.bias_init.initialize(&self.bias, rng)?;
        }
        Ok(())
    }

    fn configure(&mut self, backend: Backend, _seed: u64) {
        self.backend = backend;
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        let built = self.input_shape.clone().ok_or(Error::NotBuilt("Conv2d"))?;
        let batch = batch_size("conv2d forward", &built, x.shape())?;
        let pre = Tensor::zeros(&with_batch(batch, &self.output_shape));
        match batch {
            None => self.forward_sample(x, &pre)?,
            Some(n) => {
                for i in 0..n {
                    self.forward_sample(&x.sub_tensor(i)?, &pre.sub_tensor(i)?)?;
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

    /// Kernel gradient `corr2d(x[c], g[f])`, bias gradient `Σ g[f]`, and input
    /// gradient `Σ_f conv2d_full(g[f], K[f][c])`, all accumulated per sample.
    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        self.channels()?;
        let cache = self.cache.as_ref().ok_or(Error::MissingForward("Conv2d"))?;
        grad.expect_shape("conv2d backward", cache.out.shape())?;
        let g = self.activation.backward(&cache.pre, &cache.out, grad)?;
        let dx = cache.input.zeros_like();
        if cache.input.rank() == 3 {
            self.backward_sample(&cache.input, &g, &dx)?;
        } else {
            for i in 0..cache.input.shape()[0] {
                self.backward_sample(
                    &cache.input.sub_tensor(i)?,
                    &g.sub_tensor(i)?,
                    &dx.sub_tensor(i)?,
                )?;
            }
        }
        Ok(dx)
    }

    fn params(&self) -> TensorList<T> {
        if self.use_bias {
            vec![self.kernel.clone(), self.bias.clone()]
        } else {
            vec![self.kernel.clone()]
        }
    }

    fn grads(&self) -> TensorList<T> {
        if self.use_bias {
            vec![self.kernel_grad.clone(), self.bias_grad.clone()]
        } else {
            vec![self.kernel_grad.clone()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::init::uniform_tensor;
    use rand::SeedableRng;

    fn fixed_layer() -> Conv2d<f64> {
        let kernel = Tensor::new(vec![1.0, 2.0, -1.0, 0.0], vec![1, 1, 2, 2]).unwrap();
        let mut layer = Conv2d::new(1, &[2, 2], Activation::Linear)
            .unwrap()
            .with_weights(kernel, Tensor::from([0.5]))
            .unwrap();
        layer.build(&[1, 3, 3]).unwrap();
        layer
    }

    #[test]
    fn test_forward_is_correlation_plus_bias() {
        let mut layer = fixed_layer();
        let x = Tensor::new((1..=9).map(f64::from).collect(), vec![1, 3, 3]).unwrap();
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape(), &[1, 2, 2]);
        assert_eq!(y.to_vec(), vec![1.5, 3.5, 7.5, 9.5]);
    }

    #[test]
    fn test_backward_gradients() {
        let mut layer = fixed_layer();
        let x = Tensor::new((1..=9).map(f64::from).collect(), vec![1, 3, 3]).unwrap();
        layer.forward(&x).unwrap();
        let dx = layer
            .backward(&Tensor::new_with_filler(vec![1, 2, 2], 1.0))
            .unwrap();
        // every kernel tap sees a 2x2 block of x
        assert_eq!(layer.kernel_grad.to_vec(), vec![12.0, 16.0, 24.0, 28.0]);
        assert_eq!(layer.bias_grad.to_vec(), vec![4.0]);
        assert_eq!(
            dx.to_vec(),
            vec![1.0, 3.0, 2.0, 0.0, 2.0, 2.0, -1.0, -1.0, 0.0]
        );
    }

    #[test]
    fn test_batch_matches_single_samples() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layer = Conv2d::<f64>::new(2, &[2, 2], Activation::Tanh).unwrap();
        layer.build(&[2, 4, 4]).unwrap();
        layer.initialize(&mut rng).unwrap();
        let batch = uniform_tensor(&[3, 2, 4, 4], -1.0, 1.0, &mut rng);
        let out = layer.forward(&batch).unwrap();
        assert_eq!(out.shape(), &[3, 2, 3, 3]);
        let second = layer.forward(&batch.sub_tensor(1).unwrap()).unwrap();
        assert!(out.sub_tensor(1).unwrap().max_abs_diff(&second).unwrap() < 1e-12);
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        assert!(Conv2d::<f64>::new(0, &[2, 2], Activation::ReLU).is_err());
        assert!(Conv2d::<f64>::new(1, &[2], Activation::ReLU).is_err());
        assert!(Conv2d::<f64>::new(1, &[0, 2], Activation::ReLU).is_err());
        assert!(matches!(
            Conv2d::<f64>::new(1, &[2, 2], Activation::Softmax),
            Err(Error::Unsupported(_))
        ));
        let mut layer = Conv2d::<f64>::new(1, &[3, 3], Activation::ReLU).unwrap();
        assert!(layer.build(&[4, 4]).is_err());
        assert!(layer.build(&[1, 2, 2]).is_err());
        assert!(layer.backward(&Tensor::zeros(&[1])).is_err());
    }
}
