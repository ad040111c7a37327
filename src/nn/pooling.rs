use log::debug;

use crate::backend::{pool_output_shape, Backend};
use crate::error::{Error, Result};
use crate::nn::module::{batch_size, private, with_batch, LayerKind, Module};
use crate::tensor::{Float, Tensor, TensorList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    Max,
    Average,
}

/// Windowed max or average reduction over each channel of `[c, h, w]`
/// (or `[n, c, h, w]`).
pub struct Pool2d<T: Float> {
    mode: PoolMode,
    filter: (usize, usize),
    stride: (usize, usize),
    backend: Backend,
    input_shape: Option<Vec<usize>>,
    output_shape: Vec<usize>,
    input: Option<Tensor<T>>,
}

fn positive_pair(context: &'static str, pair: (usize, usize)) -> Result<()> {
    if pair.0 == 0 || pair.1 == 0 {
        return Err(Error::invalid_shape(
            context,
            &[pair.0, pair.1],
            "dimensions must be positive",
        ));
    }
    Ok(())
}

impl<T: Float> Pool2d<T> {
    fn with_mode(mode: PoolMode, filter: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        positive_pair("pooling filter", filter)?;
        positive_pair("pooling stride", stride)?;
        Ok(Pool2d {
            mode,
            filter,
            stride,
            backend: Backend::default(),
            input_shape: None,
            output_shape: vec![],
            input: None,
        })
    }

    /// Max pooling whose stride equals the filter.
    pub fn max(filter: (usize, usize)) -> Result<Self> {
        Self::with_mode(PoolMode::Max, filter, filter)
    }

    pub fn max_with_stride(filter: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        Self::with_mode(PoolMode::Max, filter, stride)
    }

    /// Average pooling whose stride equals the filter.
    pub fn average(filter: (usize, usize)) -> Result<Self> {
        Self::with_mode(PoolMode::Average, filter, filter)
    }

    pub fn average_with_stride(filter: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        Self::with_mode(PoolMode::Average, filter, stride)
    }

    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    pub fn filter(&self) -> (usize, usize) {
        self.filter
    }

    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    fn name(&self) -> &'static str {
        match self.mode {
            PoolMode::Max => "MaxPool2d",
            PoolMode::Average => "AvgPool2d",
        }
    }

    fn forward_sample(&self, x: &Tensor<T>, out: &Tensor<T>) -> Result<()> {
        for c in 0..x.shape()[0] {
            let (plane, dst) = (x.sub_tensor(c)?, out.sub_tensor(c)?);
            match self.mode {
                PoolMode::Max => {
                    self.backend
                        .max_pool2d_into(&plane, &dst, self.filter, self.stride)?
                }
                PoolMode::Average => {
                    self.backend
                        .avg_pool2d_into(&plane, &dst, self.filter, self.stride)?
                }
            }
        }
        Ok(())
    }

    fn backward_sample(&self, x: &Tensor<T>, g: &Tensor<T>, dx: &Tensor<T>) -> Result<()> {
        for c in 0..x.shape()[0] {
            let (g_c, dx_c) = (g.sub_tensor(c)?, dx.sub_tensor(c)?);
            match self.mode {
                PoolMode::Max => self.backend.max_pool2d_backward(
                    &x.sub_tensor(c)?,
                    &g_c,
                    &dx_c,
                    self.filter,
                    self.stride,
                )?,
                PoolMode::Average => {
                    self.backend
                        .avg_pool2d_backward(&g_c, &dx_c, self.filter, self.stride)?
                }
            }
        }
        Ok(())
    }
}

impl<T: Float> private::Private for Pool2d<T> {}

impl<T: Float> Module<T> for Pool2d<T> {
    fn kind(&self) -> LayerKind {
        match self.mode {
            PoolMode::Max => LayerKind::MaxPool2d,
            PoolMode::Average => LayerKind::AvgPool2d,
        }
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        let (channels, h, w) = match *input_shape {
            [c, h, w] if c > 0 && h > 0 && w > 0 => (c, h, w),
            _ => {
                return Err(Error::invalid_shape(
                    "pooling build",
                    input_shape,
                    "expected positive [channels, height, width]",
                ))
            }
        };
        let [oh, ow] = pool_output_shape(&[h, w], self.filter, self.stride)?;
        self.output_shape = vec![channels, oh, ow];
        self.input_shape = Some(input_shape.to_vec());
        self.input = None;
        debug!("built {} {:?} -> {:?}", self.name(), input_shape, self.output_shape);
        Ok(())
    }

    fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    fn output_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_ref().map(|_| self.output_shape.as_slice())
    }

    fn configure(&mut self, backend: Backend, _seed: u64) {
        self.backend = backend;
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        let built = self.input_shape.as_deref().ok_or(Error::NotBuilt(self.name()))?;
        let batch = batch_size("pooling forward", built, x.shape())?;
        let out = Tensor::zeros(&with_batch(batch, &self.output_shape));
        match batch {
            None => self.forward_sample(x, &out)?,
            Some(n) => {
                for i in 0..n {
                    self.forward_sample(&x.sub_tensor(i)?, &out.sub_tensor(i)?)?;
                }
            }
        }
        self.input = Some(x.clone());
        Ok(out)
    }

    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        let built = self.input_shape.as_deref().ok_or(Error::NotBuilt(self.name()))?;
        let x = self.input.as_ref().ok_or(Error::MissingForward(self.name()))?;
        let batch = batch_size("pooling backward", built, x.shape())?;
        grad.expect_shape("pooling backward", &with_batch(batch, &self.output_shape))?;
        let dx = x.zeros_like();
        match batch {
            None => self.backward_sample(x, grad, &dx)?,
            Some(n) => {
                for i in 0..n {
                    self.backward_sample(
                        &x.sub_tensor(i)?,
                        &grad.sub_tensor(i)?,
                        &dx.sub_tensor(i)?,
                    )?;
                }
            }
        }
        Ok(dx)
    }

    fn params(&self) -> TensorList<T> {
        vec![]
    }

    fn grads(&self) -> TensorList<T> {
        vec![]
    }
}

/// Averages each channel of `[c, h, w]` down to one value, giving `[c]`.
pub struct GlobalAvgPool2d<T: Float> {
    input_shape: Option<Vec<usize>>,
    output_shape: Vec<usize>,
    input: Option<Tensor<T>>,
}

impl<T: Float> GlobalAvgPool2d<T> {
    pub fn new() -> Self {
        GlobalAvgPool2d {
            input_shape: None,
            output_shape: vec![],
            input: None,
        }
    }
}

impl<T: Float> Default for GlobalAvgPool2d<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> private::Private for GlobalAvgPool2d<T> {}

impl<T: Float> Module<T> for GlobalAvgPool2d<T> {
    fn kind(&self) -> LayerKind {
        LayerKind::GlobalAvgPool2d
    }

    fn build(&mut self, input_shape: &[usize]) -> Result<()> {
        match *input_shape {
            [c, h, w] if c > 0 && h > 0 && w > 0 => {
                self.output_shape = vec![c];
                self.input_shape = Some(input_shape.to_vec());
                self.input = None;
                debug!("built GlobalAvgPool2d {:?} -> [{c}]", input_shape);
                Ok(())
            }
            _ => Err(Error::invalid_shape(
                "global pooling build",
                input_shape,
                "expected positive [channels, height, width]",
            )),
        }
    }

    fn input_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_deref()
    }

    fn output_shape(&self) -> Option<&[usize]> {
        self.input_shape.as_ref().map(|_| self.output_shape.as_slice())
    }

    fn forward(&mut self, x: &Tensor<T>) -> Result<Tensor<T>> {
        let built = self
            .input_shape
            .as_deref()
            .ok_or(Error::NotBuilt("GlobalAvgPool2d"))?;
        let batch = batch_size("global pooling forward", built, x.shape())?;
        let (channels, area) = (built[0], built[1] * built[2]);
        let rows = batch.unwrap_or(1) * channels;
        let planes = x.contiguous().reshape(vec![rows, area])?;
        let means = (0..rows)
            .map(|r| planes.sub_tensor(r).map(|plane| plane.mean()))
            .collect::<Result<Vec<T>>>()?;
        self.input = Some(x.clone());
        Tensor::new(means, with_batch(batch, &self.output_shape))
    }

    fn backward(&mut self, grad: &Tensor<T>) -> Result<Tensor<T>> {
        let built = self
            .input_shape
            .as_deref()
            .ok_or(Error::NotBuilt("GlobalAvgPool2d"))?;
        let x = self
            .input
            .as_ref()
            .ok_or(Error::MissingForward("GlobalAvgPool2d"))?;
        let batch = batch_size("global pooling backward", built, x.shape())?;
        grad.expect_shape("global pooling backward", &with_batch(batch, &self.output_shape))?;
        let area = built[1] * built[2];
        let share = T::one() / T::lit(area as f64);
        let per_plane = grad.to_vec();
        let dx = x.zeros_like();
        dx.map_indexed_inplace(|i, _| per_plane[i / area] * share);
        Ok(dx)
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

    fn image() -> Tensor<f64> {
        Tensor::new(
            vec![
                1.0, 5.0, 2.0, 0.0, //
                3.0, 4.0, 8.0, 1.0, //
                0.0, 2.0, 1.0, 1.0, //
                9.0, 1.0, 3.0, 7.0,
            ],
            vec![1, 4, 4],
        )
        .unwrap()
    }

    #[test]
    fn test_max_pool_layer_routes_gradient_to_argmax() {
        let mut layer = Pool2d::<f64>::max((2, 2)).unwrap();
        layer.build(&[1, 4, 4]).unwrap();
        let y = layer.forward(&image()).unwrap();
        assert_eq!(y.to_vec(), vec![5.0, 8.0, 9.0, 7.0]);
        let dx = layer
            .backward(&Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![1, 2, 2]).unwrap())
            .unwrap();
        assert_eq!(
            dx.to_vec(),
            vec![
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 2.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, //
                3.0, 0.0, 0.0, 4.0,
            ]
        );
    }

    #[test]
    fn test_avg_pool_layer_with_stride() {
        let mut layer = Pool2d::<f64>::average_with_stride((2, 2), (1, 1)).unwrap();
        layer.build(&[1, 4, 4]).unwrap();
        assert_eq!(Module::<f64>::output_shape(&layer), Some(&[1, 3, 3][..]));
        let batch = Tensor::stack(&[image(), image()]).unwrap();
        let y = layer.forward(&batch).unwrap();
        assert_eq!(y.shape(), &[2, 1, 3, 3]);
        assert_eq!(y.get(&[1, 0, 0, 0]).unwrap(), 13.0 / 4.0);
        let dx = layer.backward(&Tensor::new_with_filler(vec![2, 1, 3, 3], 4.0)).unwrap();
        // corners are covered by one window, the centre by four
        assert_eq!(dx.get(&[0, 0, 0, 0]).unwrap(), 1.0);
        assert_eq!(dx.get(&[1, 0, 1, 1]).unwrap(), 4.0);
    }

    #[test]
    fn test_global_average() {
        let mut layer = GlobalAvgPool2d::<f64>::new();
        layer.build(&[2, 2, 2]).unwrap();
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 8.0], vec![2, 2, 2]).unwrap();
        assert_eq!(layer.forward(&x).unwrap().to_vec(), vec![2.5, 2.0]);
        let dx = layer.backward(&Tensor::from([4.0, 8.0])).unwrap();
        assert_eq!(dx.to_vec(), vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_pool_rejects_bad_shapes() {
        assert!(Pool2d::<f64>::max((0, 2)).is_err());
        let mut layer = Pool2d::<f64>::max((3, 3)).unwrap();
        assert!(layer.build(&[1, 2, 2]).is_err());
        assert!(layer.build(&[4, 4]).is_err());
        assert_eq!(
            layer.forward(&image()).unwrap_err(),
            Error::NotBuilt("MaxPool2d")
        );
    }
}
