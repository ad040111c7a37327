//! Fixed-size worker pool for work that sits outside the training step.
//!
//! Tensors share their buffers through `Rc`, so they never leave the thread
//! that created them. Work handed to the pool is plain data: slices of values
//! in, vectors of values out. Each inference worker rebuilds its own model
//! from a [`ModelSnapshot`].

use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::nn::ModelSnapshot;
use crate::tensor::{Float, Tensor};

pub struct WorkerPool {
    pool: ThreadPool,
    config: Config,
}

impl WorkerPool {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("light-nn-worker-{i}"))
            .build()
            .map_err(|err| Error::Worker(err.to_string()))?;
        debug!("worker pool started with {} threads", config.workers);
        Ok(WorkerPool { pool, config })
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Element-wise conversion of a result array on the pool, keeping order.
    pub fn convert<A, B>(&self, values: &[A], f: impl Fn(&A) -> B + Sync + Send) -> Vec<B>
    where
        A: Sync,
        B: Send,
    {
        self.pool.install(|| values.par_iter().map(f).collect())
    }

    /// Runs inference on `samples` (each laid out in the snapshot's input
    /// shape) split across the workers. Every worker restores a private model
    /// from `snapshot`. Outputs keep the order of `samples`.
    pub fn predict_chunks<T: Float>(
        &self,
        snapshot: &ModelSnapshot<T>,
        samples: &[Vec<T>],
    ) -> Result<Vec<Vec<T>>> {
        if samples.is_empty() {
            return Ok(vec![]);
        }
        let chunk_len = (samples.len() + self.config.workers - 1) / self.config.workers;
        let config = self.config;
        let results = crossbeam::scope(|scope| {
            let handles: Vec<_> = samples
                .chunks(chunk_len)
                .map(|chunk| scope.spawn(move |_| predict_chunk(snapshot, config, chunk)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(Error::Worker("inference worker panicked".into())))
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| Error::Worker("inference scope panicked".into()))?;

        let mut outputs = Vec::with_capacity(samples.len());
        for chunk in results {
            outputs.extend(chunk?);
        }
        Ok(outputs)
    }
}

fn predict_chunk<T: Float>(
    snapshot: &ModelSnapshot<T>,
    config: Config,
    chunk: &[Vec<T>],
) -> Result<Vec<Vec<T>>> {
    let mut model = snapshot.restore(config)?;
    chunk
        .iter()
        .map(|values| {
            let x = Tensor::new(values.clone(), snapshot.input_shape.clone())?;
            Ok(model.predict(&x)?.to_vec())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::Loss;
    use crate::nn::{Activation, Linear, Sequential};
    use crate::optim::Sgd;

    #[test]
    fn test_convert_keeps_order() {
        let pool = WorkerPool::new(Config::default().with_workers(3)).unwrap();
        let losses = vec![0.5f32, 0.25, 0.125];
        let converted = pool.convert(&losses, |v| f64::from(*v));
        assert_eq!(converted, vec![0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_predict_chunks_matches_local_model() {
        let mut model = Sequential::<f64>::new();
        model.add(Linear::new(3, Activation::Tanh).unwrap()).unwrap();
        model.add(Linear::new(2, Activation::Sigmoid).unwrap()).unwrap();
        model
            .compile(Sgd::default(), Loss::MeanSquaredError, &[2])
            .unwrap();
        let snapshot = model.snapshot().unwrap();
        let samples: Vec<Vec<f64>> = (0..7).map(|i| vec![f64::from(i), -f64::from(i) / 2.0]).collect();

        let pool = WorkerPool::new(Config::default().with_workers(3)).unwrap();
        let outputs = pool.predict_chunks(&snapshot, &samples).unwrap();
        assert_eq!(outputs.len(), samples.len());
        for (sample, output) in samples.iter().zip(&outputs) {
            let local = model.predict(&Tensor::from(sample.clone())).unwrap();
            assert_eq!(&local.to_vec(), output);
        }
    }

    #[test]
    fn test_bad_samples_surface_as_errors() {
        let mut model = Sequential::<f32>::new();
        model.add(Linear::new(1, Activation::Linear).unwrap()).unwrap();
        model
            .compile(Sgd::default(), Loss::MeanSquaredError, &[2])
            .unwrap();
        let pool = WorkerPool::new(Config::default().with_workers(2)).unwrap();
        let samples = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(pool
            .predict_chunks(&model.snapshot().unwrap(), &samples)
            .is_err());
        assert!(WorkerPool::new(Config::default().with_workers(0)).is_err());
    }
}
