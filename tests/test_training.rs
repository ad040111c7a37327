use std::ops::ControlFlow;

use light_nn::loss::Loss;
use light_nn::metrics::accuracy;
use light_nn::nn::{Activation, Linear, Sequential};
use light_nn::optim::{Adam, Sgd};
use light_nn::tensor::*;
use light_nn::train::{TrainConfig, Trainer};

fn xor() -> (Vec<Tensor<f64>>, Vec<Tensor<f64>>) {
    let xs = vec![
        Tensor::from([0.0, 0.0]),
        Tensor::from([0.0, 1.0]),
        Tensor::from([1.0, 0.0]),
        Tensor::from([1.0, 1.0]),
    ];
    let ys = vec![
        Tensor::from([0.0]),
        Tensor::from([1.0]),
        Tensor::from([1.0]),
        Tensor::from([0.0]),
    ];
    (xs, ys)
}

fn xor_network() -> Sequential<f64> {
    let hidden = Linear::from_weights(
        Tensor::from([[0.5, -0.4], [0.6, 0.3]]),
        Tensor::from([0.1, -0.1]),
        Activation::Tanh,
    )
    .unwrap();
    let output = Linear::from_weights(
        Tensor::from([[0.7], [-0.5]]),
        Tensor::from([0.0]),
        Activation::Sigmoid,
    )
    .unwrap();
    let mut model = Sequential::new().with_name("xor");
    model.add(hidden).unwrap();
    model.add(output).unwrap();
    model
}

fn line(samples: usize) -> (Vec<Tensor<f64>>, Vec<Tensor<f64>>) {
    let xs: Vec<_> = (0..samples)
        .map(|i| Tensor::from([-1.0 + 2.0 * i as f64 / (samples - 1) as f64]))
        .collect();
    let ys = xs.iter().map(|x| x.map(|v| 3.0 * v - 0.5)).collect();
    (xs, ys)
}

/// Means over consecutive windows must not grow.
fn assert_non_increasing_on_average(losses: &[f64], window: usize) {
    let means: Vec<f64> = losses
        .chunks(window)
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .collect();
    for pair in means.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "window means {means:?}");
    }
}

#[test]
fn test_xor_with_fixed_weights() {
    let (xs, ys) = xor();
    let mut model = xor_network();
    model
        .compile(
            Sgd::new(0.5, 0.0, false).unwrap(),
            Loss::MeanSquaredError,
            &[2],
        )
        .unwrap();
    let trainer = Trainer::new(TrainConfig::default().with_epochs(1000).with_shuffle(false));
    let history = trainer.train(&mut model, &xs, &ys).unwrap();

    assert_eq!(history.epochs(), 1000);
    assert!(history.last_loss().unwrap() < 0.01);
    let preds: Vec<_> = xs.iter().map(|x| model.predict(x).unwrap()).collect();
    for (pred, y) in preds.iter().zip(&ys) {
        assert!((pred.item().unwrap() - y.item().unwrap()).abs() < 0.1, "{pred:?}");
    }
    assert_eq!(accuracy(&preds, &ys).unwrap(), 1.0);
}

#[test]
fn test_xor_fixed_weights_are_deterministic() {
    let (xs, ys) = xor();
    let run = || {
        let mut model = xor_network();
        model
            .compile(Sgd::new(0.5, 0.0, false).unwrap(), Loss::MeanSquaredError, &[2])
            .unwrap();
        let trainer = Trainer::new(TrainConfig::default().with_epochs(20));
        trainer.train(&mut model, &xs, &ys).unwrap().losses
    };
    assert_eq!(run(), run());
}

#[test]
fn test_linear_regression_loss_is_non_increasing_on_average() {
    let (xs, ys) = line(20);
    let mut model = Sequential::new();
    model.add(Linear::new(1, Activation::Linear).unwrap()).unwrap();
    model
        .compile(Sgd::new(0.05, 0.0, false).unwrap(), Loss::MeanSquaredError, &[1])
        .unwrap();
    let trainer = Trainer::new(TrainConfig::default().with_epochs(40).with_seed(3));
    let history = trainer.train(&mut model, &xs, &ys).unwrap();
    assert_non_increasing_on_average(&history.losses, 5);
    assert!(history.last_loss().unwrap() < 1e-6);
}

#[test]
fn test_batched_linear_regression_converges() {
    let (xs, ys) = line(24);
    let mut model = Sequential::new();
    model.add(Linear::new(1, Activation::Linear).unwrap()).unwrap();
    model
        .compile(Adam::new(0.05, 0.9, 0.999, 1e-8).unwrap(), Loss::MeanSquaredError, &[1])
        .unwrap();
    let trainer = Trainer::new(TrainConfig::default().with_epochs(200).with_batch_size(4));
    let history = trainer.train(&mut model, &xs, &ys).unwrap();
    let first = history.losses[0];
    assert!(history.last_loss().unwrap() < first / 100.0);
    assert!(!model.is_training());
}

#[test]
fn test_callback_stops_early() {
    let (xs, ys) = line(8);
    let mut model = Sequential::new();
    model.add(Linear::new(1, Activation::Linear).unwrap()).unwrap();
    model
        .compile(Sgd::new(0.05, 0.0, false).unwrap(), Loss::MeanSquaredError, &[1])
        .unwrap();
    let trainer = Trainer::new(TrainConfig::default().with_epochs(100));
    let mut seen = vec![];
    let history = trainer
        .fit(&mut model, &xs, &ys, |info| {
            seen.push(info.epoch);
            if info.epoch == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(history.epochs(), 3);
}

#[test]
fn test_training_restores_inference_mode_after_errors() {
    let (xs, mut ys) = line(4);
    ys.pop();
    let mut model = Sequential::new();
    model.add(Linear::new(1, Activation::Linear).unwrap()).unwrap();
    model
        .compile(Sgd::default(), Loss::MeanSquaredError, &[1])
        .unwrap();
    assert!(Trainer::default().train(&mut model, &xs, &ys).is_err());
    assert!(!model.is_training());
}
