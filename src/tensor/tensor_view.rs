use crate::error::{Error, Result};

use super::numeric::*;
use super::rc_tensor::*;

/// A half-open range `start..end` along one axis, taking every `step`-th element.
#[derive(Debug, PartialEq, Clone)]
pub struct SliceRange {
    /// inclusive
    pub(in crate::tensor) start: usize,
    /// exclusive
    pub(in crate::tensor) end: usize,
    pub(in crate::tensor) step: usize,
}

impl SliceRange {
    pub fn new(start: usize, end: usize) -> SliceRange {
        SliceRange {
            start,
            end,
            step: 1,
        }
    }

    pub fn with_step(start: usize, end: usize, step: usize) -> SliceRange {
        SliceRange { start, end, step }
    }

    fn len(&self) -> usize {
        if self.end <= self.start {
            return 0;
        }
        (self.end - self.start + self.step - 1) / self.step
    }
}

impl<T: Numeric> RcTensor<T> {
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1isize;
        for (&dim, &stride) in self.shape.iter().zip(self.strides.iter()).rev() {
            if dim != 1 && stride != expected {
                return false;
            }
            expected *= dim as isize;
        }
        true
    }

    /// Unit-stride tensor with the same contents. Only copies when `self` is a
    /// non-contiguous view, otherwise the result aliases `self`.
    pub fn contiguous(&self) -> RcTensor<T> {
        if self.is_contiguous() {
            self.clone()
        } else {
            self.deep_clone()
        }
    }

    /// Copies the visible elements into an independent buffer.
    pub fn deep_clone(&self) -> RcTensor<T> {
        RcTensor::from_contiguous(self.to_vec(), self.shape.clone())
    }

    /// ```
    /// # use light_nn::tensor::*;
    /// let tensor = RcTensor::new((0..6).collect(), vec![2, 3]).unwrap();
    /// let reshaped = tensor.reshape(vec![3, 2]).unwrap();
    /// assert_eq!(reshaped.get(&[2, 1]).unwrap(), 5);
    /// assert!(tensor.reshape(vec![4, 2]).is_err());
    /// ```
    pub fn reshape(&self, shape: Vec<usize>) -> Result<RcTensor<T>> {
        let expected: usize = shape.iter().product();
        if expected != self.len() {
            return Err(Error::ElementCount {
                shape,
                expected,
                actual: self.len(),
            });
        }
        let source = self.contiguous();
        Ok(RcTensor {
            buffer: source.buffer,
            strides: contiguous_strides(&shape),
            shape,
            offset: source.offset,
        })
    }

    /// Collapses every axis into one.
    pub fn flatten(&self) -> RcTensor<T> {
        let source = self.contiguous();
        let len = source.len();
        RcTensor {
            buffer: source.buffer,
            shape: vec![len],
            strides: vec![1],
            offset: source.offset,
        }
    }

    fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.rank() {
            return Err(Error::AxisOutOfBounds {
                axis,
                rank: self.rank(),
            });
        }
        Ok(())
    }

    /// Swaps two axes. The result is a view, no data moves.
    pub fn transpose(&self, a: usize, b: usize) -> Result<RcTensor<T>> {
        self.check_axis(a)?;
        self.check_axis(b)?;
        let mut view = self.clone();
        view.shape.swap(a, b);
        view.strides.swap(a, b);
        Ok(view)
    }

    /// Matrix transpose.
    ///
    /// ```
    /// # use light_nn::tensor::*;
    /// let matrix = RcTensor::new(vec![1, 2, 3, 4, 5, 6], vec![2, 3]).unwrap();
    /// let transposed = matrix.t().unwrap();
    /// assert_eq!(transposed.shape(), &[3, 2]);
    /// assert_eq!(transposed.to_vec(), vec![1, 4, 2, 5, 3, 6]);
    /// assert!(transposed.shares_buffer(&matrix));
    /// ```
    pub fn t(&self) -> Result<RcTensor<T>> {
        if self.rank() != 2 {
            return Err(Error::invalid_shape(
                "t",
                &self.shape,
                "matrix transpose needs a rank 2 tensor",
            ));
        }
        self.transpose(0, 1)
    }

    /// Reorders the axes so that axis `i` of the result is axis `axes[i]` of `self`.
    pub fn permute(&self, axes: &[usize]) -> Result<RcTensor<T>> {
        if axes.len() != self.rank() {
            return Err(Error::LengthMismatch {
                context: "permute",
                expected: self.rank(),
                actual: axes.len(),
            });
        }
        let mut seen = vec![false; axes.len()];
        for &axis in axes {
            self.check_axis(axis)?;
            if seen[axis] {
                return Err(Error::InvalidParameter(format!(
                    "permute: axis {axis} appears twice in {axes:?}"
                )));
            }
            seen[axis] = true;
        }
        let mut view = self.clone();
        view.shape = axes.iter().map(|&axis| self.shape[axis]).collect();
        view.strides = axes.iter().map(|&axis| self.strides[axis]).collect();
        Ok(view)
    }

    /// View of the `index`-th slab along the leading axis, one rank lower.
    ///
    /// ```
    /// # use light_nn::tensor::*;
    /// let batch = RcTensor::new((0..12).collect(), vec![3, 2, 2]).unwrap();
    /// let second = batch.sub_tensor(1).unwrap();
    /// assert_eq!(second.shape(), &[2, 2]);
    /// assert_eq!(second.to_vec(), vec![4, 5, 6, 7]);
    /// ```
    pub fn sub_tensor(&self, index: usize) -> Result<RcTensor<T>> {
        if self.rank() == 0 {
            return Err(Error::invalid_shape(
                "sub_tensor",
                &self.shape,
                "a scalar has no sub-tensors",
            ));
        }
        if index >= self.shape[0] {
            return Err(Error::IndexOutOfBounds {
                index: vec![index],
                shape: self.shape.clone(),
            });
        }
        let offset = self.offset as isize + index as isize * self.strides[0];
        Ok(RcTensor {
            buffer: self.buffer.clone(),
            shape: self.shape[1..].to_vec(),
            strides: self.strides[1..].to_vec(),
            offset: offset as usize,
        })
    }

    /// Narrows the leading axes. Axes without a range are kept whole.
    pub fn slice(&self, ranges: &[SliceRange]) -> Result<RcTensor<T>> {
        if ranges.len() > self.rank() {
            return Err(Error::LengthMismatch {
                context: "slice",
                expected: self.rank(),
                actual: ranges.len(),
            });
        }
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        let mut offset = self.offset as isize;
        for (axis, range) in ranges.iter().enumerate() {
            if range.step == 0 || range.start > range.end || range.end > self.shape[axis] {
                return Err(Error::InvalidParameter(format!(
                    "slice: range {range:?} does not fit axis {axis} of shape {:?}",
                    self.shape
                )));
            }
            offset += range.start as isize * self.strides[axis];
            shape[axis] = range.len();
            strides[axis] *= range.step as isize;
        }
        RcTensor::from_parts(self.buffer.clone(), shape, strides, offset as usize)
    }

    /// Inserts an axis of length one at `axis`.
    pub fn unsqueeze(&self, axis: usize) -> Result<RcTensor<T>> {
        if axis > self.rank() {
            return Err(Error::AxisOutOfBounds {
                axis,
                rank: self.rank(),
            });
        }
        let stride = if axis < self.rank() {
            self.strides[axis] * self.shape[axis] as isize
        } else {
            1
        };
        let mut view = self.clone();
        view.shape.insert(axis, 1);
        view.strides.insert(axis, stride);
        Ok(view)
    }
}

#[test]
fn test_reshape_non_contiguous_copies() {
    let matrix = RcTensor::new((0..6).collect(), vec![2, 3]).unwrap();
    let transposed = matrix.t().unwrap();
    let flat = transposed.reshape(vec![6]).unwrap();
    assert_eq!(flat.to_vec(), vec![0, 3, 1, 4, 2, 5]);
    assert!(!flat.shares_buffer(&matrix));
}

#[test]
fn test_reshape_contiguous_aliases() {
    let matrix = RcTensor::new(vec![0.0; 6], vec![2, 3]).unwrap();
    let flat = matrix.reshape(vec![6]).unwrap();
    flat.set(&[4], 1.5).unwrap();
    assert_eq!(matrix.get(&[1, 1]).unwrap(), 1.5);
}

#[test]
fn test_permute_rejects_repeated_axis() {
    let tensor = RcTensor::new((0..8).collect(), vec![2, 2, 2]).unwrap();
    assert!(tensor.permute(&[0, 0, 1]).is_err());
    let permuted = tensor.permute(&[2, 0, 1]).unwrap();
    assert_eq!(permuted.get(&[1, 0, 0]).unwrap(), tensor.get(&[0, 0, 1]).unwrap());
}

#[test]
fn test_slice_with_step() {
    let tensor = RcTensor::new((0..10).collect(), vec![10]).unwrap();
    let every_third = tensor.slice(&[SliceRange::with_step(1, 10, 3)]).unwrap();
    assert_eq!(every_third.to_vec(), vec![1, 4, 7]);
    assert!(tensor.slice(&[SliceRange::new(3, 11)]).is_err());
}

#[test]
fn test_sub_tensor_of_transpose() {
    let matrix = RcTensor::new((0..6).collect(), vec![2, 3]).unwrap();
    let column = matrix.t().unwrap().sub_tensor(2).unwrap();
    assert_eq!(column.to_vec(), vec![2, 5]);
    assert!(!column.is_contiguous());
}

#[test]
fn test_unsqueeze_leading_axis() {
    let row = RcTensor::new(vec![1, 2, 3], vec![3]).unwrap();
    let matrix = row.unsqueeze(0).unwrap();
    assert_eq!(matrix.shape(), &[1, 3]);
    assert_eq!(matrix.t().unwrap().shape(), &[3, 1]);
}
