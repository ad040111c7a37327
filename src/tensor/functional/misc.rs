use crate::error::{Error, Result};
use crate::tensor::numeric::*;
use crate::tensor::RcTensor;

impl<T: Numeric> RcTensor<T> {
    pub fn sum(&self) -> T {
        let buffer = self.buffer();
        self.addresses()
            .fold(T::zero(), |acc, address| acc + buffer[address])
    }

    /// Largest element. Fails on an empty tensor.
    pub fn max(&self) -> Result<T> {
        let index = self.argmax()?;
        Ok(self.to_vec()[index])
    }

    pub fn min(&self) -> Result<T> {
        let values = self.to_vec();
        let mut best = *values
            .first()
            .ok_or_else(|| Error::invalid_shape("min", self.shape(), "tensor is empty"))?;
        for &value in values.iter().skip(1) {
            if value < best {
                best = value;
            }
        }
        Ok(best)
    }

    /// Row-major position of the largest element. The first maximum wins ties.
    ///
    /// ```
    /// # use light_nn::tensor::*;
    /// let tensor = RcTensor::new(vec![1, 7, 3, 7], vec![2, 2]).unwrap();
    /// assert_eq!(tensor.argmax().unwrap(), 1);
    /// ```
    pub fn argmax(&self) -> Result<usize> {
        let values = self.to_vec();
        let mut best = *values
            .first()
            .ok_or_else(|| Error::invalid_shape("argmax", self.shape(), "tensor is empty"))?;
        let mut best_index = 0;
        for (i, &value) in values.iter().enumerate().skip(1) {
            if value > best {
                best = value;
                best_index = i;
            }
        }
        Ok(best_index)
    }

    /// Sums over the leading axis: `[n, ...] -> [...]`.
    pub fn sum_axis0(&self) -> Result<RcTensor<T>> {
        if self.rank() == 0 {
            return Err(Error::invalid_shape(
                "sum_axis0",
                self.shape(),
                "a scalar has no leading axis",
            ));
        }
        let result = RcTensor::zeros(&self.shape()[1..]);
        for i in 0..self.shape()[0] {
            result.add_assign_tensor(&self.sub_tensor(i)?)?;
        }
        Ok(result)
    }

    /// Concatenates equally shaped tensors along a new leading axis.
    ///
    /// ```
    /// # use light_nn::tensor::*;
    /// let a = RcTensor::new(vec![1, 2], vec![2]).unwrap();
    /// let b = RcTensor::new(vec![3, 4], vec![2]).unwrap();
    /// let batch = RcTensor::stack(&[a, b]).unwrap();
    /// assert_eq!(batch.shape(), &[2, 2]);
    /// assert_eq!(batch.to_vec(), vec![1, 2, 3, 4]);
    /// ```
    pub fn stack(tensors: &[RcTensor<T>]) -> Result<RcTensor<T>> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::InvalidParameter("stack needs at least one tensor".into()))?;
        let mut array = Vec::with_capacity(first.len() * tensors.len());
        for tensor in tensors {
            first.check_same_shape("stack", tensor)?;
            array.extend(tensor.to_vec());
        }
        let mut shape = vec![tensors.len()];
        shape.extend_from_slice(first.shape());
        Ok(RcTensor::from_contiguous(array, shape))
    }
}

impl<T: Float> RcTensor<T> {
    pub fn mean(&self) -> T {
        if self.is_empty() {
            return T::zero();
        }
        self.sum() / T::lit(self.len() as f64)
    }

    /// Euclidean norm of all elements.
    pub fn norm(&self) -> T {
        let buffer = self.buffer();
        self.addresses()
            .map(|address| buffer[address] * buffer[address])
            .sum::<T>()
            .sqrt()
    }

    /// Largest absolute element-wise difference, used for tolerance checks.
    pub fn max_abs_diff(&self, other: &RcTensor<T>) -> Result<T> {
        self.check_same_shape("max_abs_diff", other)?;
        Ok(self
            .to_vec()
            .into_iter()
            .zip(other.to_vec())
            .fold(T::zero(), |acc, (a, b)| acc.max((a - b).abs())))
    }
}

/// Generalised dot product: the accumulated sum of the element-wise product.
pub fn dot<T: Numeric>(left: &RcTensor<T>, right: &RcTensor<T>) -> Result<T> {
    left.check_same_shape("dot", right)?;
    Ok(left
        .to_vec()
        .into_iter()
        .zip(right.to_vec())
        .fold(T::zero(), |acc, (a, b)| acc + a * b))
}

#[test]
fn test_dot() {
    let v = vec![0, 1, 2];
    let vec = RcTensor::new(v, vec![3]).unwrap();
    assert_eq!(dot(&vec, &vec).unwrap(), 5);
}

#[test]
fn test_sum_of_view() {
    let matrix = RcTensor::new((0..6).collect(), vec![2, 3]).unwrap();
    assert_eq!(matrix.sub_tensor(1).unwrap().sum(), 12);
    assert_eq!(matrix.t().unwrap().sum(), 15);
}

#[test]
fn test_sum_axis0() {
    let batch = RcTensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![3, 2]).unwrap();
    assert_eq!(batch.sum_axis0().unwrap().to_vec(), vec![9.0, 12.0]);
}

#[test]
fn test_stack_rejects_mismatched_shapes() {
    let a = RcTensor::new(vec![1, 2], vec![2]).unwrap();
    let b = RcTensor::new(vec![1, 2, 3], vec![3]).unwrap();
    assert!(RcTensor::stack(&[a, b]).is_err());
    assert!(RcTensor::<i32>::stack(&[]).is_err());
}

#[test]
fn test_argmax_empty_is_error() {
    assert!(RcTensor::<f64>::zeros(&[0]).argmax().is_err());
}
