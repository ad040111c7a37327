//! A small neural-network training engine.
//!
//! Tensors are strided views over shared buffers ([`tensor`]). Numeric
//! kernels live behind a [`backend::Backend`] value. Layers implement
//! hand-written forward and backward passes ([`nn`]), optimizers update
//! parameters in place ([`optim`]) and [`train::Trainer`] drives the epoch
//! loop.
//!
//! ```
//! use std::ops::ControlFlow;
//! use light_nn::loss::Loss;
//! use light_nn::nn::{Activation, Linear, Sequential};
//! use light_nn::optim::Sgd;
//! use light_nn::tensor::Tensor;
//! use light_nn::train::{TrainConfig, Trainer};
//!
//! let mut model = Sequential::<f64>::new();
//! model.add(Linear::new(1, Activation::Linear).unwrap()).unwrap();
//! model.compile(Sgd::new(0.1, 0.0, false).unwrap(), Loss::MeanSquaredError, &[1]).unwrap();
//!
//! let xs: Vec<_> = (0..4).map(|i| Tensor::from([f64::from(i) / 4.0])).collect();
//! let ys: Vec<_> = xs.iter().map(|x| x.map(|v| 2.0 * v + 1.0)).collect();
//! let trainer = Trainer::new(TrainConfig::default().with_epochs(5));
//! let history = trainer
//!     .fit(&mut model, &xs, &ys, |_| ControlFlow::Continue(()))
//!     .unwrap();
//! assert_eq!(history.losses.len(), 5);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod nn;
pub mod optim;
pub mod parallel;
pub mod tensor;
pub mod train;

pub use config::Config;
pub use error::{Error, Result};
