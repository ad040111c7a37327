use crate::tensor::RcTensor;

// These are all aliases kept for readability at call sites.
pub type TensorList<T> = Vec<RcTensor<T>>;

pub type Tensor<T> = RcTensor<T>;

pub type Scalar<T> = RcTensor<T>;

pub type Shape = Vec<usize>;
