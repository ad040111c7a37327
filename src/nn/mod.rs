//! Layers and the sequential model that chains them.

mod activation;
mod conv;
mod dropout;
mod flatten;
pub mod init;
mod layer;
mod linear;
mod model;
pub(crate) mod module;
mod pooling;
mod sequential;

pub use activation::{Activation, ActivationLayer};
pub use conv::Conv2d;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use init::Initializer;
pub use layer::Layer;
pub use linear::Linear;
pub use model::{LayerConfig, ModelSnapshot};
pub use module::{LayerKind, Module};
pub use pooling::{GlobalAvgPool2d, Pool2d, PoolMode};
pub use sequential::Sequential;
