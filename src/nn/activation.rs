use std::f64::consts::PI;

use crate::error::{Error, Result};
use crate::nn::module::{batch_size, positive_shape, private, LayerKind, Module};
use crate::tensor::{Float, Tensor, TensorList};

const GELU_CUBIC: f64 = 0.044715;
const SELU_ALPHA: f64 = 1.673_263_24;
const SELU_SCALE: f64 = 1.050_700_98;

/// Element-wise nonlinearities, plus the row-wise Softmax and Argmax.
///
/// Rank 2 inputs are treated as a batch of rows by Softmax and Argmax; every
/// other function ignores the layout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Activation {
    #[default]
    Linear,
    ReLU,
    LeakyReLU {
        alpha: f64,
    },
    ELU {
        alpha: f64,
    },
    SELU,
    /// tanh approximation
    GELU,
    Sigmoid,
    Tanh,
    Swish,
    Softplus,
    Atan,
    Sin,
    Softmax,
    /// One-hot of the largest entry. Has no derivative.
    Argmax,
}

impl Activation {
    pub fn leaky_relu() -> Activation {
        Activation::LeakyReLU { alpha: 0.01 }
    }

    pub fn elu() -> Activation {
        Activation::ELU { alpha: 0.01 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Linear => "linear",
            Activation::ReLU => "relu",
            Activation::LeakyReLU { .. } => "leaky_relu",
            Activation::ELU { .. } => "elu",
            Activation::SELU => "selu",
            Activation::GELU => "gelu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Swish => "swish",
            Activation::Softplus => "softplus",
            Activation::Atan => "atan",
            Activation::Sin => "sin",
            Activation::Softmax => "softmax",
            Activation::Argmax => "argmax",
        }
    }

    fn is_row_wise(&self) -> bool {
        matches!(self, Activation::Softmax | Activation::Argmax)
    }

    /// Softmax and Argmax mix values across a row, which a convolution's feature maps do not have.
    pub fn supports_spatial(&self) -> bool {
        !self.is_row_wise()
    }

    fn fx<T: Float>(&self, x: T) -> T {
        let one = T::one();
        match *self {
            Activation::Linear => x,
            Activation::ReLU => x.max(T::zero()),
            Activation::LeakyReLU { alpha } => {
                if x > T::zero() {
                    x
                } else {
                    T::lit(alpha) * x
                }
            }
            Activation::ELU { alpha } => {
                if x > T::zero() {
                    x
                } else {
                    T::lit(alpha) * (x.exp() - one)
                }
            }
            Activation::SELU => {
                let scale = T::lit(SELU_SCALE);
                if x > T::zero() {
                    scale * x
                } else {
                    scale * T::lit(SELU_ALPHA) * (x.exp() - one)
                }
            }
            Activation::GELU => {
                let inner = T::lit((2.0 / PI).sqrt()) * (x + T::lit(GELU_CUBIC) * x.powi(3));
                T::lit(0.5) * x * (one + inner.tanh())
            }
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Swish => x * sigmoid(x),
            Activation::Softplus => x.max(T::zero()) + (one + (-x.abs()).exp()).ln(),
            Activation::Atan => x.atan(),
            Activation::Sin => x.sin(),
            Activation::Softmax | Activation::Argmax => x,
        }
    }

    /// Local derivative given the pre-activation `x` and the output `y`.
    fn dx<T: Float>(&self, x: T, y: T) -> T {
        let one = T::one();
        match *self {
            Activation::Linear => one,
            Activation::ReLU => {
                if x > T::zero() {
                    one
                } else {
                    T::zero()
                }
            }
            Activation::LeakyReLU { alpha } => {
                if x > T::zero() {
                    one
                } else {
                    T::lit(alpha)
                }
            }
            Activation::ELU { alpha } => {
                if x > T::zero() {
                    one
                } else {
                    T::lit(alpha) * x.exp()
                }
            }
            Activation::SELU => {
                let scale = T::lit(SELU_SCALE);
                if x > T::zero() {
                    scale
                } else {
                    scale * T::lit(SELU_ALPHA) * x.exp()
                }
            }
            Activation::GELU => {
                let c = T::lit((2.0 / PI).sqrt());
                let k = T::lit(GELU_CUBIC);
                let t = (c * (x + k * x.powi(3))).tanh();
                let half = T::lit(0.5);
                half * (one + t) + half * x * (one - t * t) * c * (one + T::lit(3.0) * k * x * x)
            }
            // stable forms from the cached output
            Activation::Sigmoid => y * (one - y),
            Activation::Tanh => one - y * y,
            Activation::Swish => {
                let s = sigmoid(x);
                s + x * s * (one - s)
            }
            Activation::Softplus => sigmoid(x),
            Activation::Atan => one / (one + x * x),
            Activation::Sin => x.cos(),
            Activation::Softmax | Activation::Argmax => one,
        }
    }

    /// Applies the function to `x`, producing a new tensor.
    pub fn forward<T: Float>(&self, x: &Tensor<T>) -> Result<Tensor<T>> {
        match self {
            Activation::Softmax => row_wise(x, softmax_row),
            Activation::Argmax => row_wise(x, argmax_row),
            _ => Ok(x.map(|value| self.fx(value))),
        }
    }

    /// Multiplies `grad` by the local derivative. `pre` and `out` are the cached
    /// input and output of the matching forward call.
    pub fn backward<T: Float>(
        &self,
        pre: &Tensor<T>,
        out: &Tensor<T>,
        grad: &Tensor<T>,
    ) -> Result<Tensor<T>> {
        grad.expect_shape("activation backward", out.shape())?;
        match self {
            Activation::Argmax => Err(Error::Unsupported(
                "argmax has no derivative and cannot be trained through".into(),
            )),
            Activation::Softmax => {
                let result = grad.deep_clone();
                let (rows, width) = rows_of(out);
                let s = out.to_vec();
                result.map_indexed_inplace({
                    let g = grad.to_vec();
                    let dots: Vec<T> = (0..rows)
                        .map(|r| {
                            (0..width)
                                .map(|c| g[r * width + c] * s[r * width + c])
                                .sum::<T>()
                        })
                        .collect();
                    move |i, g_i| s[i] * (g_i - dots[i / width.max(1)])
                });
                Ok(result)
            }
            _ => {
                let x = pre.to_vec();
                let y = out.to_vec();
                let result = grad.deep_clone();
                result.map_indexed_inplace(|i, g| g * self.dx(x[i], y[i]));
                Ok(result)
            }
        }
    }
}

fn sigmoid<T: Float>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

/// `(rows, width)` of a tensor viewed as rows over its last axis.
fn rows_of<T: Float>(x: &Tensor<T>) -> (usize, usize) {
    let width = x.shape().last().copied().unwrap_or(1);
    let rows = if width == 0 { 0 } else { x.len() / width };
    (rows, width)
}

fn row_wise<T: Float>(x: &Tensor<T>, f: fn(&[T], &mut [T])) -> Result<Tensor<T>> {
    if x.rank() == 0 || x.rank() > 2 {
        return Err(Error::invalid_shape(
            "row-wise activation",
            x.shape(),
            "expected a vector or a batch of vectors",
        ));
    }
    let (_, width) = rows_of(x);
    let values = x.to_vec();
    let mut result = vec![T::zero(); values.len()];
    for (row, out) in values
        .chunks(width.max(1))
        .zip(result.chunks_mut(width.max(1)))
    {
        f(row, out);
    }
    Tensor::new(result, x.shape().to_vec())
}

fn softmax_row<T: Float>(row: &[T], out: &mut [T]) {
    let max = row.iter().copied().fold(T::neg_infinity(), T::max);
    let mut total = T::zero();
    for (o, &v) in out.iter_mut().zip(row) {
        *o = (v - max).exp();
        total += *o;
    }
    for o in out.iter_mut() {
        *o /= total;
    }
}

fn argmax_row<T: Float>(row: &[T], out: &mut [T]) {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    if let Some(slot) = out.get_mut(best) {
        *slot = T::one();
    }
}

/// A standalone activation layer.
pub struct ActivationLayer<T: Float> {
    activation: Activation,
    shape: Option<Vec<usize>>,
    pre: Option<Tensor<T>>,
    out: Option<Tensor<T>>,
}

impl<T: Float> ActivationLayer<T> {
    pub fn new(activation: Activation) -> Self {
        ActivationLayer {
            activation,
            shape: None,
            pre: None,
            out: None,
        }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl<T: Float> private::Private for ActivationLayer<T> {}

impl<T: Float> Module<T> for ActivationLayer<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::Activation
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        positive_shape("activation build", input_shape)?;
        // A batch axis is added on top, and the row-wise forms handle at most rank 2.
        if self.activation.is_row_wise() && input_shape.len() > 1 {
            return Err(Error::invalid_shape(
                "activation build",
                input_shape,
                "softmax and argmax need one-dimensional samples",
            ));
        }
        self.shape = Some(input_shape.to_vec());
        Ok(())
    }

    fn input_shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    fn output_shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        let shape = self.shape.as_deref().ok_or(Error::NotBuilt("Activation"))?;
        batch_size("activation forward", shape, x.shape())?;
        let out = self.activation.forward(x)?;
        self.pre = Some(x.clone());
        self.out = Some(out.clone());
        Ok(out)
    }

    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        if self.shape.is_none() {
            return Err(Error::NotBuilt("Activation"));
        }
        match (&self.pre, &self.out) {
            (Some(pre), Some(out)) => self.activation.backward(pre, out, grad),
            _ => Err(Error::MissingForward("Activation")),
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

    fn numeric_derivative(activation: Activation, x: f64) -> f64 {
        let h = 1e-6;
        (activation.fx(x + h) - activation.fx(x - h)) / (2.0 * h)
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let functions = [
            Activation::Linear,
            Activation::leaky_relu(),
            Activation::elu(),
            Activation::SELU,
            Activation::GELU,
            Activation::Sigmoid,
            Activation::Tanh,
            Activation::Swish,
            Activation::Softplus,
            Activation::Atan,
            Activation::Sin,
        ];
        for activation in functions {
            for &x in &[-2.3, -0.4, 0.7, 1.9] {
                let y = activation.fx(x);
                let analytic = activation.dx(x, y);
                let numeric = numeric_derivative(activation, x);
                assert!(
                    (analytic - numeric).abs() < 1e-5,
                    "{} at {x}: {analytic} vs {numeric}",
                    activation.name()
                );
            }
        }
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x: Tensor<f64> = Tensor::from([[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]);
        let y = Activation::Softmax.forward(&x).unwrap();
        assert!((y.sub_tensor(0).unwrap().sum() - 1.0).abs() < 1e-12);
        assert!((y.get(&[1, 2]).unwrap() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_softmax_backward_is_jacobian_product() {
        let x: Tensor<f64> = Tensor::from([0.5, -1.0, 2.0]);
        let g = Tensor::from([1.0, 0.0, 0.0]);
        let y = Activation::Softmax.forward(&x).unwrap();
        let dx = Activation::Softmax.backward(&x, &y, &g).unwrap();
        let s = y.to_vec();
        // d s0 / d x_j = s0 (delta_0j - s_j)
        let expected = vec![s[0] * (1.0 - s[0]), -s[0] * s[1], -s[0] * s[2]];
        for (a, b) in dx.to_vec().into_iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_argmax_forward_only() {
        let x: Tensor<f32> = Tensor::from([0.1, 0.9, 0.9]);
        let y = Activation::Argmax.forward(&x).unwrap();
        assert_eq!(y.to_vec(), vec![0.0, 1.0, 0.0]);
        assert!(matches!(
            Activation::Argmax.backward(&x, &y, &x),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_layer_requires_build_and_forward() {
        let mut layer = ActivationLayer::<f64>::new(Activation::ReLU);
        let x = Tensor::from([-1.0, 2.0]);
        assert!(matches!(layer.forward(&x), Err(Error::NotBuilt(_))));
        layer.build(&[2]).unwrap();
        assert!(matches!(
            layer.backward(&x),
            Err(Error::MissingForward(_))
        ));
        assert_eq!(layer.forward(&x).unwrap().to_vec(), vec![0.0, 2.0]);
        assert_eq!(
            layer.backward(&Tensor::from([5.0, 5.0])).unwrap().to_vec(),
            vec![0.0, 5.0]
        );
    }

    #[test]
    fn test_row_wise_layers_reject_spatial_samples() {
        let mut softmax = ActivationLayer::<f64>::new(Activation::Softmax);
        assert!(softmax.build(&[2, 3, 4]).is_err());
        assert!(softmax.build(&[3, 4]).is_err());
        softmax.build(&[4]).unwrap();
        let mut argmax = ActivationLayer::<f64>::new(Activation::Argmax);
        assert!(argmax.build(&[1, 4]).is_err());
        let mut relu = ActivationLayer::<f64>::new(Activation::ReLU);
        relu.build(&[2, 3, 4]).unwrap();
    }
}
