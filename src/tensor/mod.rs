pub mod functional;
mod numeric;
mod rc_tensor;
mod tensor_view;
mod types;
mod utils;

pub use numeric::*;
pub use rc_tensor::*;
pub use tensor_view::*;
pub use types::*;
