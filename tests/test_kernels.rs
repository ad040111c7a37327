use light_nn::backend::Backend;
use light_nn::nn::{Activation, Conv2d, Module, Pool2d};
use light_nn::tensor::functional::dot;
use light_nn::tensor::*;

fn plane(rows: usize, cols: usize, seed: f64) -> Tensor<f64> {
    Tensor::new(
        (0..rows * cols)
            .map(|i| ((i as f64 + 1.0) * seed).sin())
            .collect(),
        vec![rows, cols],
    )
    .unwrap()
}

#[test]
fn test_corr2d_known_values() {
    let input = Tensor::new((1..=9).map(f64::from).collect(), vec![3, 3]).unwrap();
    let kernel = Tensor::from([[1.0, 2.0], [-1.0, 0.0]]);
    for backend in [Backend::Cpu, Backend::Threaded] {
        let out = backend.corr2d(&input, &kernel).unwrap();
        assert_eq!(out, Tensor::from([[1.0, 3.0], [7.0, 9.0]]));
    }
}

#[test]
fn test_kernels_accumulate_into_destination() {
    let input = Tensor::new((1..=9).map(f64::from).collect(), vec![3, 3]).unwrap();
    let kernel = Tensor::from([[1.0, 2.0], [-1.0, 0.0]]);
    let dst = Tensor::new_with_filler(vec![2, 2], 10.0);
    Backend::Cpu.corr2d_into(&input, &kernel, &dst).unwrap();
    Backend::Cpu.corr2d_into(&input, &kernel, &dst).unwrap();
    assert_eq!(dst, Tensor::from([[12.0, 16.0], [24.0, 28.0]]));
}

#[test]
fn test_conv2d_is_flipped_correlation() {
    let input = plane(5, 4, 0.7);
    let kernel = Tensor::from([[1.0, 2.0], [-1.0, 0.5]]);
    let flipped = Tensor::from([[0.5, -1.0], [2.0, 1.0]]);
    let conv = Backend::Cpu.conv2d(&input, &kernel).unwrap();
    let corr = Backend::Cpu.corr2d(&input, &flipped).unwrap();
    assert!(conv.max_abs_diff(&corr).unwrap() < 1e-12);
}

#[test]
fn test_conv2d_full_shape_and_corner() {
    let input = plane(3, 4, 0.3);
    let kernel = Tensor::from([[1.0, 2.0], [3.0, 4.0]]);
    let out = Backend::Cpu.conv2d_full(&input, &kernel).unwrap();
    assert_eq!(out.shape(), &[4, 5]);
    // Only the kernel's first tap overlaps the first input element.
    assert!((out.get(&[0, 0]).unwrap() - input.get(&[0, 0]).unwrap()).abs() < 1e-12);
    assert!((out.get(&[3, 4]).unwrap() - 4.0 * input.get(&[2, 3]).unwrap()).abs() < 1e-12);
}

#[test]
fn test_threaded_backend_matches_cpu() {
    let a = plane(7, 5, 0.9);
    let b = plane(5, 3, 1.3);
    let kernel = plane(3, 2, 2.1);
    let (cpu, threaded) = (Backend::Cpu, Backend::Threaded);
    let pairs = [
        (cpu.matmul(&a, &b).unwrap(), threaded.matmul(&a, &b).unwrap()),
        (cpu.corr2d(&a, &kernel).unwrap(), threaded.corr2d(&a, &kernel).unwrap()),
        (
            cpu.conv2d_full(&a, &kernel).unwrap(),
            threaded.conv2d_full(&a, &kernel).unwrap(),
        ),
        (
            cpu.matmul(&b.t().unwrap(), &a.t().unwrap()).unwrap(),
            threaded.matmul(&b.t().unwrap(), &a.t().unwrap()).unwrap(),
        ),
    ];
    for (left, right) in pairs {
        assert!(left.max_abs_diff(&right).unwrap() < 1e-12);
    }
}

#[test]
fn test_kernels_reject_aliased_destination() {
    let a = plane(3, 3, 0.5);
    let view = a.slice(&[SliceRange::new(0, 2), SliceRange::new(0, 2)]).unwrap();
    assert!(Backend::Cpu.corr2d_into(&a, &Tensor::from([[1.0, 0.0], [0.0, 1.0]]), &view).is_err());
    assert!(Backend::Cpu.matmul_into(&a, &a.deep_clone(), &a).is_err());
}

#[test]
fn test_max_pool_backward_lands_on_argmax_only() {
    let input = Tensor::from([
        [1.0, 9.0, 2.0, 0.0],
        [3.0, 4.0, 5.0, 8.0],
        [7.0, 1.0, 6.0, 2.0],
        [0.0, 2.0, 3.0, 1.0],
    ]);
    let pooled = Backend::Cpu.max_pool2d(&input, (2, 2), (2, 2)).unwrap();
    assert_eq!(pooled, Tensor::from([[9.0, 8.0], [7.0, 6.0]]));

    let grad = Tensor::from([[0.1, 0.2], [0.3, 0.4]]);
    let dx = input.zeros_like();
    Backend::Cpu
        .max_pool2d_backward(&input, &grad, &dx, (2, 2), (2, 2))
        .unwrap();
    let expected = Tensor::from([
        [0.0, 0.1, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.2],
        [0.3, 0.0, 0.4, 0.0],
        [0.0, 0.0, 0.0, 0.0],
    ]);
    assert_eq!(dx, expected);
}

#[test]
fn test_max_pool_ties_route_to_first_maximum() {
    let input = Tensor::from([[5.0, 5.0], [5.0, 5.0]]);
    let dx = input.zeros_like();
    Backend::Cpu
        .max_pool2d_backward(&input, &Tensor::from([[1.0]]), &dx, (2, 2), (2, 2))
        .unwrap();
    assert_eq!(dx, Tensor::from([[1.0, 0.0], [0.0, 0.0]]));
}

#[test]
fn test_max_pool_layer_routes_batch_gradients() {
    let mut pool = Pool2d::<f64>::max((2, 2)).unwrap();
    pool.build(&[1, 2, 2]).unwrap();
    let x = Tensor::from([[[[1.0, 3.0], [2.0, 0.0]]], [[[4.0, 1.0], [1.0, 1.0]]]]);
    let out = pool.forward(&x).unwrap();
    assert_eq!(out.to_vec(), vec![3.0, 4.0]);
    let dx = pool.backward(&Tensor::from([[[[2.0]]], [[[5.0]]]])).unwrap();
    assert_eq!(dx.to_vec(), vec![0.0, 2.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0]);
}

/// The input gradient of a convolution is a full convolution of the output
/// gradient with the kernel. Checked against central differences.
#[test]
fn test_conv2d_full_input_gradient_matches_finite_differences() {
    let kernel = Tensor::new(
        (0..2 * 2 * 3 * 2).map(|i| (f64::from(i) * 0.61).cos()).collect(),
        vec![2, 2, 3, 2],
    )
    .unwrap();
    let bias = Tensor::from([0.1, -0.2]);
    let mut conv = Conv2d::new(2, &[3, 2], Activation::Linear)
        .unwrap()
        .with_weights(kernel, bias)
        .unwrap();
    conv.build(&[2, 5, 4]).unwrap();
    assert_eq!(conv.output_shape().unwrap(), &[2, 3, 3]);

    let x = Tensor::new(
        (0..2 * 5 * 4).map(|i| (f64::from(i) * 0.37).sin()).collect(),
        vec![2, 5, 4],
    )
    .unwrap();
    // L = Σ w ⊙ conv(x), so dL/dout = w.
    let weights = Tensor::new(
        (0..2 * 3 * 3).map(|i| (f64::from(i) * 1.7).sin()).collect(),
        vec![2, 3, 3],
    )
    .unwrap();
    let objective = |conv: &mut Conv2d<f64>, x: &Tensor<f64>| {
        let out = conv.forward(x).unwrap();
        dot(&out, &weights).unwrap()
    };

    objective(&mut conv, &x);
    let analytic = conv.backward(&weights).unwrap().to_vec();

    let h = 1e-5;
    for i in 0..x.len() {
        let up = x.deep_clone();
        up.map_indexed_inplace(|j, v| if j == i { v + h } else { v });
        let down = x.deep_clone();
        down.map_indexed_inplace(|j, v| if j == i { v - h } else { v });
        let numeric = (objective(&mut conv, &up) - objective(&mut conv, &down)) / (2.0 * h);
        assert!(
            (numeric - analytic[i]).abs() < 1e-4,
            "input {i}: numeric {numeric}, analytic {}",
            analytic[i]
        );
    }
}
