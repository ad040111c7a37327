//! Numeric kernels and the backend selection seam.
//!
//! A [`Backend`] is a plain value chosen once (normally through
//! [`Config`](crate::config::Config)) and copied into every layer when the
//! model is compiled. Both backends satisfy the same contract: shapes are
//! validated before any buffer is touched, and every kernel accumulates into
//! its destination, so callers zero the destination before a fresh pass.
//!
//! ```
//! # use light_nn::backend::Backend;
//! # use light_nn::tensor::*;
//! let input: Tensor<f64> = Tensor::from([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
//! let kernel = Tensor::from([[1.0, 2.0], [-1.0, 0.0]]);
//! let output = Backend::Cpu.corr2d(&input, &kernel).unwrap();
//! assert_eq!(output.to_vec(), vec![1.0, 3.0, 7.0, 9.0]);
//! ```

mod cpu;
mod shapes;
mod threaded;

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::error::{Error, Result};
use crate::tensor::{Float, Tensor};
use cpu::{Plane, Window};

pub use shapes::{corr_output_shape, full_output_shape, matmul_output_shape, pool_output_shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Single-threaded reference kernels.
    #[default]
    Cpu,
    /// `matmul`, `corr2d` and `conv2d_full` split their output rows over the rayon pool.
    Threaded,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            Backend::Threaded => write!(f, "threaded"),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(value: &str) -> Result<Backend> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Backend::Cpu),
            "threaded" | "rayon" => Ok(Backend::Threaded),
            other => Err(Error::InvalidParameter(format!("unknown backend `{other}`"))),
        }
    }
}

fn plane_of<T: Float>(context: &'static str, tensor: &Tensor<T>) -> Result<Plane> {
    match (tensor.shape(), tensor.strides()) {
        (&[rows, cols], &[row_stride, col_stride]) => Ok(Plane {
            offset: tensor.offset(),
            rows,
            cols,
            row_stride,
            col_stride,
        }),
        (&[cols], &[col_stride]) => Ok(Plane {
            offset: tensor.offset(),
            rows: 1,
            cols,
            row_stride: 0,
            col_stride,
        }),
        _ => Err(Error::invalid_shape(
            context,
            tensor.shape(),
            "expected a rank 1 or rank 2 tensor",
        )),
    }
}

fn expect_rank2<T: Float>(context: &'static str, tensor: &Tensor<T>) -> Result<()> {
    if tensor.rank() != 2 {
        return Err(Error::invalid_shape(
            context,
            tensor.shape(),
            "expected a rank 2 plane",
        ));
    }
    Ok(())
}

fn ensure_distinct<T: Float>(
    context: &'static str,
    dst: &Tensor<T>,
    sources: &[&Tensor<T>],
) -> Result<()> {
    if sources.iter().any(|source| source.shares_buffer(dst)) {
        return Err(Error::AliasedBuffers(context));
    }
    Ok(())
}

impl Backend {
    pub fn log_selection(&self) {
        debug!("numeric backend resolved to {self}");
    }

    /// `[k] x [k, n] -> [n]` or `[m, k] x [k, n] -> [m, n]`, into a fresh tensor.
    pub fn matmul<T: Float>(&self, a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>> {
        let dst = Tensor::zeros(&matmul_output_shape(a.shape(), b.shape())?);
        self.matmul_into(a, b, &dst)?;
        Ok(dst)
    }

    /// `dst += a · b`
    pub fn matmul_into<T: Float>(&self, a: &Tensor<T>, b: &Tensor<T>, dst: &Tensor<T>) -> Result<()> {
        let expected = matmul_output_shape(a.shape(), b.shape())?;
        dst.expect_shape("matmul destination", &expected)?;
        ensure_distinct("matmul", dst, &[a, b])?;
        let (la, lb, lc) = (
            plane_of("matmul left operand", a)?,
            plane_of("matmul right operand", b)?,
            plane_of("matmul destination", dst)?,
        );
        let (a_buf, b_buf) = (a.buffer(), b.buffer());
        let mut c_buf = dst.buffer_mut();
        match self {
            Backend::Cpu => cpu::matmul(&a_buf, la, &b_buf, lb, &mut c_buf, lc),
            Backend::Threaded => threaded::matmul(&a_buf, la, &b_buf, lb, &mut c_buf, lc),
        }
        Ok(())
    }

    pub fn corr2d<T: Float>(&self, input: &Tensor<T>, kernel: &Tensor<T>) -> Result<Tensor<T>> {
        let dst = Tensor::zeros(&corr_output_shape(input.shape(), kernel.shape())?);
        self.corr2d_into(input, kernel, &dst)?;
        Ok(dst)
    }

    /// `dst[i,j] += Σ input[i+l, j+m] * kernel[l,m]`
    pub fn corr2d_into<T: Float>(
        &self,
        input: &Tensor<T>,
        kernel: &Tensor<T>,
        dst: &Tensor<T>,
    ) -> Result<()> {
        let (lx, lk, ld) = self.conv_planes("corr2d", input, kernel, dst, false)?;
        let (x_buf, k_buf) = (input.buffer(), kernel.buffer());
        let mut d_buf = dst.buffer_mut();
        match self {
            Backend::Cpu => cpu::corr2d(&x_buf, lx, &k_buf, lk, &mut d_buf, ld),
            Backend::Threaded => threaded::corr2d(&x_buf, lx, &k_buf, lk, &mut d_buf, ld),
        }
        Ok(())
    }

    pub fn conv2d<T: Float>(&self, input: &Tensor<T>, kernel: &Tensor<T>) -> Result<Tensor<T>> {
        let dst = Tensor::zeros(&corr_output_shape(input.shape(), kernel.shape())?);
        self.conv2d_into(input, kernel, &dst)?;
        Ok(dst)
    }

    /// Valid convolution: correlation with the kernel flipped on both axes.
    pub fn conv2d_into<T: Float>(
        &self,
        input: &Tensor<T>,
        kernel: &Tensor<T>,
        dst: &Tensor<T>,
    ) -> Result<()> {
        let (lx, lk, ld) = self.conv_planes("conv2d", input, kernel, dst, false)?;
        let (x_buf, k_buf) = (input.buffer(), kernel.buffer());
        let mut d_buf = dst.buffer_mut();
        cpu::conv2d(&x_buf, lx, &k_buf, lk, &mut d_buf, ld);
        Ok(())
    }

    pub fn conv2d_full<T: Float>(&self, input: &Tensor<T>, kernel: &Tensor<T>) -> Result<Tensor<T>> {
        let dst = Tensor::zeros(&full_output_shape(input.shape(), kernel.shape())?);
        self.conv2d_full_into(input, kernel, &dst)?;
        Ok(dst)
    }

    /// Zero-padded convolution with output `(h + kh - 1, w + kw - 1)`.
    pub fn conv2d_full_into<T: Float>(
        &self,
        input: &Tensor<T>,
        kernel: &Tensor<T>,
        dst: &Tensor<T>,
    ) -> Result<()> {
        let (lx, lk, ld) = self.conv_planes("conv2d_full", input, kernel, dst, true)?;
        let (x_buf, k_buf) = (input.buffer(), kernel.buffer());
        let mut d_buf = dst.buffer_mut();
        match self {
            Backend::Cpu => cpu::conv2d_full(&x_buf, lx, &k_buf, lk, &mut d_buf, ld),
            Backend::Threaded => threaded::conv2d_full(&x_buf, lx, &k_buf, lk, &mut d_buf, ld),
        }
        Ok(())
    }

    fn conv_planes<T: Float>(
        &self,
        context: &'static str,
        input: &Tensor<T>,
        kernel: &Tensor<T>,
        dst: &Tensor<T>,
        full: bool,
    ) -> Result<(Plane, Plane, Plane)> {
        expect_rank2(context, input)?;
        expect_rank2(context, kernel)?;
        let expected = if full {
            full_output_shape(input.shape(), kernel.shape())?
        } else {
            corr_output_shape(input.shape(), kernel.shape())?
        };
        dst.expect_shape(context, &expected)?;
        ensure_distinct(context, dst, &[input, kernel])?;
        Ok((
            plane_of(context, input)?,
            plane_of(context, kernel)?,
            plane_of(context, dst)?,
        ))
    }

    fn pool_planes<T: Float>(
        &self,
        context: &'static str,
        input_shape: &[usize],
        pooled: &Tensor<T>,
        filter: (usize, usize),
        stride: (usize, usize),
    ) -> Result<()> {
        let expected = pool_output_shape(input_shape, filter, stride)?;
        pooled.expect_shape(context, &expected)
    }

    pub fn max_pool2d<T: Float>(
        &self,
        input: &Tensor<T>,
        filter: (usize, usize),
        stride: (usize, usize),
    ) -> Result<Tensor<T>> {
        let dst = Tensor::zeros(&pool_output_shape(input.shape(), filter, stride)?);
        self.max_pool2d_into(input, &dst, filter, stride)?;
        Ok(dst)
    }

    pub fn max_pool2d_into<T: Float>(
        &self,
        input: &Tensor<T>,
        dst: &Tensor<T>,
        filter: (usize, usize),
        stride: (usize, usize),
    ) -> Result<()> {
        expect_rank2("max_pool2d", input)?;
        self.pool_planes("max_pool2d destination", input.shape(), dst, filter, stride)?;
        ensure_distinct("max_pool2d", dst, &[input])?;
        let (lx, ld) = (plane_of("max_pool2d", input)?, plane_of("max_pool2d", dst)?);
        let x_buf = input.buffer();
        let mut d_buf = dst.buffer_mut();
        cpu::max_pool2d(&x_buf, lx, Window { filter, stride }, &mut d_buf, ld);
        Ok(())
    }

    /// Adds each entry of `grad` to the position in `dst` that held its window's maximum.
    /// `dst` has the shape of `input`.
    pub fn max_pool2d_backward<T: Float>(
        &self,
        input: &Tensor<T>,
        grad: &Tensor<T>,
        dst: &Tensor<T>,
        filter: (usize, usize),
        stride: (usize, usize),
    ) -> Result<()> {
        expect_rank2("max_pool2d_backward", input)?;
        self.pool_planes("max_pool2d_backward gradient", input.shape(), grad, filter, stride)?;
        dst.expect_shape("max_pool2d_backward destination", input.shape())?;
        ensure_distinct("max_pool2d_backward", dst, &[input, grad])?;
        let lx = plane_of("max_pool2d_backward", input)?;
        let lg = plane_of("max_pool2d_backward", grad)?;
        let ld = plane_of("max_pool2d_backward", dst)?;
        let (x_buf, g_buf) = (input.buffer(), grad.buffer());
        let mut d_buf = dst.buffer_mut();
        cpu::max_pool2d_backward(&x_buf, lx, &g_buf, lg, Window { filter, stride }, &mut d_buf, ld);
        Ok(())
    }

    pub fn avg_pool2d<T: Float>(
        &self,
        input: &Tensor<T>,
        filter: (usize, usize),
        stride: (usize, usize),
    ) -> Result<Tensor<T>> {
        let dst = Tensor::zeros(&pool_output_shape(input.shape(), filter, stride)?);
        self.avg_pool2d_into(input, &dst, filter, stride)?;
        Ok(dst)
    }

    pub fn avg_pool2d_into<T: Float>(
        &self,
        input: &Tensor<T>,
        dst: &Tensor<T>,
        filter: (usize, usize),
        stride: (usize, usize),
    ) -> Result<()> {
        expect_rank2("avg_pool2d", input)?;
        self.pool_planes("avg_pool2d destination", input.shape(), dst, filter, stride)?;
        ensure_distinct("avg_pool2d", dst, &[input])?;
        let (lx, ld) = (plane_of("avg_pool2d", input)?, plane_of("avg_pool2d", dst)?);
        let x_buf = input.buffer();
        let mut d_buf = dst.buffer_mut();
        cpu::avg_pool2d(&x_buf, lx, Window { filter, stride }, &mut d_buf, ld);
        Ok(())
    }

    /// Spreads `grad / (fh * fw)` over every window. `dst` has the pooled input's shape.
    pub fn avg_pool2d_backward<T: Float>(
        &self,
        grad: &Tensor<T>,
        dst: &Tensor<T>,
        filter: (usize, usize),
        stride: (usize, usize),
    ) -> Result<()> {
        expect_rank2("avg_pool2d_backward", dst)?;
        self.pool_planes("avg_pool2d_backward gradient", dst.shape(), grad, filter, stride)?;
        ensure_distinct("avg_pool2d_backward", dst, &[grad])?;
        let (lg, ld) = (
            plane_of("avg_pool2d_backward", grad)?,
            plane_of("avg_pool2d_backward", dst)?,
        );
        let g_buf = grad.buffer();
        let mut d_buf = dst.buffer_mut();
        cpu::avg_pool2d_backward(&g_buf, lg, Window { filter, stride }, &mut d_buf, ld);
        Ok(())
    }
}
