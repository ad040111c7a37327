mod element_wise_ops;
mod misc;

pub use element_wise_ops::element_wise_multiplication;
pub use misc::dot;
