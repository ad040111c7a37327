use log::debug;

use crate::backend::Backend;
use crate::error::{Error, Result};

/// Engine-wide settings, resolved once before a model is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    /// Seeds parameter initialisation and dropout masks.
    pub seed: u64,
    /// Size of the worker pool used by [`crate::parallel`].
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: Backend::Cpu,
            seed: 42,
            workers: 4,
        }
    }
}

impl Config {
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidParameter(
                "the worker pool needs at least one thread".into(),
            ));
        }
        Ok(())
    }

    /// Validates the settings and logs the choices once.
    pub fn resolve(self) -> Result<Config> {
        self.validate()?;
        self.backend.log_selection();
        debug!("seed {} with {} workers", self.seed, self.workers);
        Ok(self)
    }
}

#[test]
fn test_builder_and_validation() {
    let config = Config::default()
        .with_backend(Backend::Threaded)
        .with_seed(7)
        .with_workers(2);
    assert_eq!(config.resolve().unwrap().backend, Backend::Threaded);
    assert!(Config::default().with_workers(0).resolve().is_err());
}
