use std::ops::{Add, Mul, Sub};

use itertools::izip;

use crate::error::{Error, Result};
use crate::tensor::numeric::*;
use crate::tensor::RcTensor;

impl<T: Numeric> RcTensor<T> {
    pub(crate) fn check_same_shape(
        &self,
        context: &'static str,
        other: &RcTensor<T>,
    ) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::shape_mismatch(context, self.shape(), other.shape()));
        }
        Ok(())
    }

    /// Applies `f` to every element, producing a new tensor.
    pub fn map(&self, f: impl Fn(T) -> T) -> RcTensor<T> {
        let array = self.to_vec().into_iter().map(f).collect();
        RcTensor::from_contiguous(array, self.shape().to_vec())
    }

    /// Combines two equally shaped tensors element by element. There is no broadcasting.
    ///
    /// ```
    /// # use light_nn::tensor::*;
    /// let left = RcTensor::new(vec![1, 2, 3], vec![3]).unwrap();
    /// let right = RcTensor::new(vec![10, 20, 30], vec![3]).unwrap();
    /// let sum = left.map2(&right, |a, b| a + b).unwrap();
    /// assert_eq!(sum.to_vec(), vec![11, 22, 33]);
    /// let column = RcTensor::new(vec![1, 2, 3], vec![3, 1]).unwrap();
    /// assert!(left.map2(&column, |a, b| a + b).is_err());
    /// ```
    pub fn map2(&self, other: &RcTensor<T>, f: impl Fn(T, T) -> T) -> Result<RcTensor<T>> {
        self.check_same_shape("map2", other)?;
        let array = izip!(self.to_vec(), other.to_vec())
            .map(|(a, b)| f(a, b))
            .collect();
        Ok(RcTensor::from_contiguous(array, self.shape().to_vec()))
    }

    pub fn map_inplace(&self, f: impl Fn(T) -> T) {
        self.map_indexed_inplace(|_, value| f(value));
    }

    /// Rewrites every element with `f(logical_index, value)`, visiting them in row-major order.
    pub fn map_indexed_inplace(&self, mut f: impl FnMut(usize, T) -> T) {
        let addresses = self.addresses();
        let mut buffer = self.buffer_mut();
        for (i, address) in addresses.enumerate() {
            buffer[address] = f(i, buffer[address]);
        }
    }

    /// Overwrites every element with successive values from `next`.
    pub fn map_inplace_with(&self, mut next: impl FnMut() -> T) {
        self.map_indexed_inplace(|_, _| next());
    }

    /// `self[i] = f(self[i], other[i])`. `other` may alias `self`.
    pub fn zip_apply(&self, other: &RcTensor<T>, f: impl Fn(T, T) -> T) -> Result<()> {
        self.check_same_shape("zip_apply", other)?;
        let values = other.to_vec();
        self.map_indexed_inplace(|i, value| f(value, values[i]));
        Ok(())
    }

    /// Overwrites the elements, in row-major order, with `values`.
    pub fn assign(&self, values: &[T]) -> Result<()> {
        if values.len() != self.len() {
            return Err(Error::ElementCount {
                shape: self.shape().to_vec(),
                expected: self.len(),
                actual: values.len(),
            });
        }
        self.map_indexed_inplace(|i, _| values[i]);
        Ok(())
    }

    pub fn copy_from(&self, other: &RcTensor<T>) -> Result<()> {
        self.zip_apply(other, |_, value| value)
    }

    pub fn fill(&self, value: T) {
        self.map_inplace(|_| value);
    }

    pub fn zero(&self) {
        self.fill(T::zero());
    }

    pub fn add_assign_tensor(&self, other: &RcTensor<T>) -> Result<()> {
        self.zip_apply(other, |a, b| a + b)
    }

    pub fn scale(&self, factor: T) {
        self.map_inplace(|value| value * factor);
    }

    pub fn scaled(&self, factor: T) -> RcTensor<T> {
        self.map(|value| value * factor)
    }

    pub fn add_scalar(&self, value: T) -> RcTensor<T> {
        self.map(|elem| elem + value)
    }

    pub fn add(&self, other: &RcTensor<T>) -> Result<RcTensor<T>> {
        self.map2(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &RcTensor<T>) -> Result<RcTensor<T>> {
        self.map2(other, |a, b| a - b)
    }

    /// Element-wise (Hadamard) product.
    pub fn mul(&self, other: &RcTensor<T>) -> Result<RcTensor<T>> {
        self.map2(other, |a, b| a * b)
    }
}

impl<'a, T: Numeric> Add for &'a RcTensor<T> {
    type Output = Result<RcTensor<T>>;

    fn add(self, right: &'a RcTensor<T>) -> Self::Output {
        RcTensor::add(self, right)
    }
}

impl<'a, T: Numeric> Sub for &'a RcTensor<T> {
    type Output = Result<RcTensor<T>>;

    fn sub(self, right: &'a RcTensor<T>) -> Self::Output {
        RcTensor::sub(self, right)
    }
}

impl<'a, T: Numeric> Mul for &'a RcTensor<T> {
    type Output = Result<RcTensor<T>>;

    fn mul(self, right: &'a RcTensor<T>) -> Self::Output {
        RcTensor::mul(self, right)
    }
}

pub fn element_wise_multiplication<T: Numeric>(
    left: &RcTensor<T>,
    right: &RcTensor<T>,
) -> Result<RcTensor<T>> {
    left.mul(right)
}

#[test]
fn test_element_wise_multiplication() {
    let left: RcTensor<i32> = RcTensor::from([1, 2, 3]);
    let right = RcTensor::from([7, 2, 8]);
    assert_eq!((&left * &right).unwrap(), RcTensor::from([7, 4, 24]));
}

#[test]
fn test_zip_apply_through_transposed_view() {
    let matrix = RcTensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
    let other = RcTensor::new(vec![10.0, 20.0, 30.0, 40.0], vec![2, 2]).unwrap();
    matrix.t().unwrap().add_assign_tensor(&other).unwrap();
    assert_eq!(matrix.to_vec(), vec![11.0, 32.0, 23.0, 44.0]);
}

#[test]
fn test_zip_apply_with_alias() {
    let tensor = RcTensor::new(vec![1, 2, 3, 4], vec![4]).unwrap();
    let alias = tensor.clone();
    tensor.add_assign_tensor(&alias).unwrap();
    assert_eq!(tensor.to_vec(), vec![2, 4, 6, 8]);
}

#[test]
fn test_assign_rejects_wrong_count() {
    let tensor = RcTensor::<f32>::zeros(&[2, 2]);
    assert!(tensor.assign(&[1.0, 2.0, 3.0]).is_err());
    tensor.assign(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(tensor.get(&[1, 0]).unwrap(), 3.0);
}
