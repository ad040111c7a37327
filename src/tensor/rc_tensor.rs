use std::cell::{Ref, RefCell, RefMut};
use std::convert::From;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};

use super::numeric::*;
use super::utils::*;

/// The core `struct` in this library.
///
/// An `RcTensor` is a strided view `(buffer, shape, strides, offset)` over a
/// reference-counted buffer. Cloning the handle aliases the buffer: a write
/// through one clone is visible through every other view of it. Out-of-place
/// operations and [`RcTensor::deep_clone`] allocate a fresh buffer.
#[derive(Clone)]
pub struct RcTensor<T: Numeric> {
    pub(in crate::tensor) buffer: Rc<RefCell<Vec<T>>>,
    pub(in crate::tensor) shape: Vec<usize>,
    pub(in crate::tensor) strides: Vec<isize>,
    pub(in crate::tensor) offset: usize,
}

pub(in crate::tensor) fn contiguous_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = 1isize;
    for (stride, &dim) in strides.iter_mut().zip(shape.iter()).rev() {
        *stride = step;
        step *= dim.max(1) as isize;
    }
    strides
}

impl<T: Numeric> RcTensor<T> {
    /// ```
    /// # use light_nn::tensor::*;
    /// let matrix = RcTensor::new(vec![0, 1, 2, 3, 4, 5], vec![2, 3]).unwrap();
    /// assert_eq!(matrix.get(&[1, 0]).unwrap(), 3);
    /// assert!(RcTensor::new(vec![0, 1, 2], vec![2, 2]).is_err());
    /// ```
    pub fn new(array: Vec<T>, shape: Vec<usize>) -> Result<RcTensor<T>> {
        let expected: usize = shape.iter().product();
        if expected != array.len() {
            return Err(Error::ElementCount {
                shape,
                expected,
                actual: array.len(),
            });
        }
        Ok(RcTensor::from_contiguous(array, shape))
    }

    pub(crate) fn from_contiguous(array: Vec<T>, shape: Vec<usize>) -> RcTensor<T> {
        debug_assert_eq!(array.len(), shape.iter().product::<usize>());
        RcTensor {
            buffer: Rc::new(RefCell::new(array)),
            strides: contiguous_strides(&shape),
            shape,
            offset: 0,
        }
    }

    /// Builds a view over an existing buffer, checking that every reachable address is in range.
    pub(in crate::tensor) fn from_parts(
        buffer: Rc<RefCell<Vec<T>>>,
        shape: Vec<usize>,
        strides: Vec<isize>,
        offset: usize,
    ) -> Result<RcTensor<T>> {
        if shape.len() != strides.len() {
            return Err(Error::invalid_shape(
                "view",
                &shape,
                "one stride per dimension is required",
            ));
        }
        if shape.iter().all(|&dim| dim > 0) {
            let mut low = offset as isize;
            let mut high = offset as isize;
            for (&dim, &stride) in shape.iter().zip(strides.iter()) {
                let reach = (dim as isize - 1) * stride;
                if reach < 0 {
                    low += reach;
                } else {
                    high += reach;
                }
            }
            let len = buffer.borrow().len() as isize;
            if low < 0 || high >= len {
                return Err(Error::invalid_shape(
                    "view",
                    &shape,
                    &format!("addresses {low}..={high} fall outside a buffer of {len} elements"),
                ));
            }
        }
        Ok(RcTensor {
            buffer,
            shape,
            strides,
            offset,
        })
    }

    pub fn zeros(shape: &[usize]) -> RcTensor<T> {
        RcTensor::new_with_filler(shape.to_vec(), T::zero())
    }

    pub fn zeros_like(&self) -> RcTensor<T> {
        RcTensor::zeros(&self.shape)
    }

    pub fn new_with_filler(shape: Vec<usize>, filler: T) -> RcTensor<T> {
        let len = shape.iter().product();
        RcTensor::from_contiguous(vec![filler; len], shape)
    }

    pub fn scalar(scalar: T) -> RcTensor<T> {
        RcTensor::from_contiguous(vec![scalar], vec![])
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements reachable through this view.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn same_shape(&self, other: &RcTensor<T>) -> bool {
        self.shape == other.shape
    }

    /// Fails with a [`Error::ShapeMismatch`] naming `context` unless the shape is `expected`.
    pub fn expect_shape(&self, context: &'static str, expected: &[usize]) -> Result<()> {
        if self.shape != expected {
            return Err(Error::shape_mismatch(context, expected, &self.shape));
        }
        Ok(())
    }

    pub fn shares_buffer(&self, other: &RcTensor<T>) -> bool {
        Rc::ptr_eq(&self.buffer, &other.buffer)
    }

    pub(crate) fn address(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.shape.len()
            || index.iter().zip(self.shape.iter()).any(|(i, dim)| i >= dim)
        {
            return Err(Error::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        let address = index
            .iter()
            .zip(self.strides.iter())
            .fold(self.offset as isize, |acc, (&i, &stride)| {
                acc + i as isize * stride
            });
        Ok(address as usize)
    }

    /// ```
    /// # use light_nn::tensor::*;
    /// let tensor = RcTensor::new((0..8).collect(), vec![2, 2, 2]).unwrap();
    /// assert_eq!(tensor.get(&[1, 0, 1]).unwrap(), 5);
    /// assert!(tensor.get(&[2, 0, 0]).is_err());
    /// assert!(tensor.get(&[0, 0]).is_err());
    /// ```
    pub fn get(&self, index: &[usize]) -> Result<T> {
        let address = self.address(index)?;
        Ok(self.buffer.borrow()[address])
    }

    pub fn set(&self, index: &[usize], value: T) -> Result<()> {
        let address = self.address(index)?;
        self.buffer.borrow_mut()[address] = value;
        Ok(())
    }

    pub fn first(&self) -> Result<T> {
        if self.is_empty() {
            return Err(Error::invalid_shape("first", &self.shape, "tensor is empty"));
        }
        Ok(self.buffer.borrow()[self.offset])
    }

    /// The single value of a one-element tensor.
    pub fn item(&self) -> Result<T> {
        if self.len() != 1 {
            return Err(Error::invalid_shape(
                "item",
                &self.shape,
                "only one-element tensors convert to a value",
            ));
        }
        self.first()
    }

    /// Row-major copy of the elements reachable through this view.
    pub fn to_vec(&self) -> Vec<T> {
        let buffer = self.buffer.borrow();
        if self.is_contiguous() {
            return buffer[self.offset..self.offset + self.len()].to_vec();
        }
        self.addresses().map(|address| buffer[address]).collect()
    }

    pub(crate) fn addresses(&self) -> OffsetIterator {
        OffsetIterator::new(&self.shape, &self.strides, self.offset)
    }

    pub(crate) fn buffer(&self) -> Ref<'_, Vec<T>> {
        self.buffer.borrow()
    }

    pub(crate) fn buffer_mut(&self) -> RefMut<'_, Vec<T>> {
        self.buffer.borrow_mut()
    }
}

impl<T: Numeric> fmt::Debug for RcTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RcTensor")
            .field("shape", &self.shape)
            .field("values", &self.to_vec())
            .finish()
    }
}

/// Tensors compare by shape and logical contents, never by layout.
impl<T: Numeric> PartialEq for RcTensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.to_vec() == other.to_vec()
    }
}

impl<T> From<T> for RcTensor<T>
where
    T: Numeric,
{
    fn from(value: T) -> Self {
        RcTensor::scalar(value)
    }
}

/// Nested literals. Every row must share one shape.
///
/// # Panics
/// On ragged input, since a literal is fixed at the call site.
impl<T, U> From<Vec<U>> for RcTensor<T>
where
    T: Numeric,
    RcTensor<T>: From<U>,
{
    fn from(value: Vec<U>) -> RcTensor<T> {
        let rows: Vec<RcTensor<T>> = value.into_iter().map(RcTensor::from).collect();
        let inner = rows
            .first()
            .map(|row| row.shape.clone())
            .unwrap_or_default();
        assert!(
            rows.iter().all(|row| row.shape == inner),
            "ragged tensor literal: every row must have shape {inner:?}"
        );
        let array = rows.iter().flat_map(|row| row.to_vec()).collect();
        let mut shape = vec![rows.len()];
        shape.extend(inner);
        RcTensor::from_contiguous(array, shape)
    }
}

impl<T, U, const N: usize> From<[U; N]> for RcTensor<T>
where
    T: Numeric,
    RcTensor<T>: From<U>,
{
    fn from(value: [U; N]) -> RcTensor<T> {
        <RcTensor<T> as From<Vec<U>>>::from(Vec::from(value))
    }
}

#[test]
fn test_nested_literal_shape() {
    let tensor: RcTensor<i32> = RcTensor::from([[[1, 2], [3, 4]], [[5, 6], [7, 8]]]);
    assert_eq!(tensor.shape(), &[2, 2, 2]);
    assert_eq!(tensor.to_vec(), (1..=8).collect::<Vec<_>>());
}

#[test]
#[should_panic(expected = "ragged tensor literal")]
fn test_ragged_literal_panics() {
    let _: RcTensor<i32> = RcTensor::from(vec![vec![1, 2], vec![3]]);
}

#[test]
fn test_clone_aliases_buffer() {
    let tensor = RcTensor::new(vec![1.0, 2.0, 3.0], vec![3]).unwrap();
    let alias = tensor.clone();
    alias.set(&[1], 20.0).unwrap();
    assert_eq!(tensor.get(&[1]).unwrap(), 20.0);
    assert!(alias.shares_buffer(&tensor));
}

#[test]
fn test_from_parts_rejects_out_of_range_view() {
    let tensor = RcTensor::new(vec![0; 6], vec![6]).unwrap();
    let view = RcTensor::from_parts(tensor.buffer.clone(), vec![2, 3], vec![3, 1], 1);
    assert!(view.is_err());
}

#[test]
fn test_item_requires_single_element() {
    assert_eq!(RcTensor::scalar(3.5).item().unwrap(), 3.5);
    assert!(RcTensor::<f64>::zeros(&[2]).item().is_err());
}
