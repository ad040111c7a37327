use light_nn::tensor::functional::dot;
use light_nn::tensor::*;

#[test]
fn test_from_vec() {
    let tensor1 = Tensor::from(vec![vec![0, 1, 2], vec![3, 4, 5]]);
    let tensor2 = Tensor::new((0..6).collect(), vec![2, 3]).unwrap();
    assert_eq!(tensor1, tensor2);
}

#[test]
fn test_new_rejects_wrong_element_count() {
    assert!(Tensor::new(vec![1, 2, 3], vec![2, 2]).is_err());
}

#[test]
fn test_get_3x3x4() {
    let matrix = Tensor::new((0..(3 * 3 * 4)).collect(), vec![3, 3, 4]).unwrap();
    assert_eq!(matrix.get(&[0, 0, 0]).unwrap(), 0);
    assert_eq!(matrix.get(&[2, 2, 3]).unwrap(), 3 * 3 * 4 - 1);
}

#[test]
fn test_get_3x3() {
    let matrix = Tensor::new(vec![0, 1, 2, 3, 4, 5, 6, 7, 8], vec![3, 3]).unwrap();
    let mut prev = -1;
    for i in 0..3 {
        for j in 0..3 {
            let curr = matrix.get(&[i, j]).unwrap();
            assert_eq!(prev + 1, curr);
            prev = curr;
        }
    }
    assert_eq!(matrix.get(&[1, 0]).unwrap(), 3);
    assert_eq!(matrix.get(&[2, 2]).unwrap(), 8);
    assert!(matrix.get(&[0, 3]).is_err());
    assert!(matrix.get(&[0]).is_err());
}

#[test]
fn test_set_writes_through_views() {
    let matrix = Tensor::new((0..6).collect(), vec![2, 3]).unwrap();
    let view = matrix.t().unwrap();
    view.set(&[2, 1], 42).unwrap();
    assert_eq!(matrix.get(&[1, 2]).unwrap(), 42);
}

#[test]
fn test_add_scalar() {
    let tensor1 = Tensor::new((0..32).collect(), vec![2, 4, 4]).unwrap();
    let tensor2 = Tensor::new((42..(32 + 42)).collect(), vec![2, 4, 4]).unwrap();
    assert_eq!(tensor1.add_scalar(42), tensor2);
}

#[test]
fn test_add() {
    let tensor1 = Tensor::new_with_filler(vec![2, 4, 4], 1);
    let tensor2 = Tensor::new((0..32).collect(), vec![2, 4, 4]).unwrap();
    let tensor3 = Tensor::new((1..33).collect(), vec![2, 4, 4]).unwrap();
    assert_eq!((&tensor2 + &tensor1).unwrap(), tensor3);
    assert_eq!((&tensor1 + &tensor2).unwrap(), tensor3);
    // No broadcasting.
    assert!((&Tensor::new_with_filler(vec![4, 4], 1) + &tensor2).is_err());
}

#[test]
fn test_dot() {
    let vec = Tensor::new(vec![0, 1, 2], vec![3]).unwrap();
    assert_eq!(dot(&vec, &vec).unwrap(), 5);
    assert!(dot(&vec, &Tensor::from([1, 2])).is_err());
}

#[test]
fn test_creation() {
    let matrix = Tensor::new(vec![0, 1, 2, 3], vec![2, 2]).unwrap();
    let _ = format!("Matrix: \n{:?}", matrix);
    assert_eq!(matrix.get(&[0, 0]).unwrap(), 0);
}

#[test]
fn test_scaled() {
    let vec = Tensor::new_with_filler(vec![4], 1);
    assert_eq!(vec.scaled(42), Tensor::new(vec![42, 42, 42, 42], vec![4]).unwrap());
}

#[test]
fn test_reshape_round_trip() {
    let tensor = Tensor::new((0..24).collect(), vec![2, 3, 4]).unwrap();
    let back = tensor
        .reshape(vec![6, 4])
        .and_then(|t| t.reshape(vec![4, 3, 2]))
        .and_then(|t| t.reshape(vec![2, 3, 4]))
        .unwrap();
    assert_eq!(back, tensor);
    assert_eq!(back.to_vec(), (0..24).collect::<Vec<_>>());
}

#[test]
fn test_transpose_round_trip() {
    let tensor = Tensor::new((0..24).collect(), vec![2, 3, 4]).unwrap();
    let swapped = tensor.transpose(0, 2).unwrap();
    assert_eq!(swapped.shape(), &[4, 3, 2]);
    assert!(swapped.shares_buffer(&tensor));
    assert_eq!(swapped.get(&[3, 1, 0]).unwrap(), tensor.get(&[0, 1, 3]).unwrap());
    assert_eq!(swapped.transpose(0, 2).unwrap(), tensor);
    assert!(tensor.transpose(0, 3).is_err());
}

#[test]
fn test_reshape_of_transposed_view_copies_in_logical_order() {
    let matrix = Tensor::new((0..6).collect(), vec![2, 3]).unwrap();
    let flat = matrix.t().unwrap().reshape(vec![6]).unwrap();
    assert_eq!(flat.to_vec(), vec![0, 3, 1, 4, 2, 5]);
    assert_eq!(flat.reshape(vec![3, 2]).unwrap().t().unwrap(), matrix);
}

#[test]
fn test_sub_tensor_and_slice_share_storage() {
    let tensor = Tensor::new((0..12).collect(), vec![3, 4]).unwrap();
    let row = tensor.sub_tensor(1).unwrap();
    assert_eq!(row.to_vec(), vec![4, 5, 6, 7]);
    let cols = tensor
        .slice(&[SliceRange::new(0, 3), SliceRange::with_step(0, 4, 2)])
        .unwrap();
    assert_eq!(cols.to_vec(), vec![0, 2, 4, 6, 8, 10]);
    cols.fill(0);
    assert_eq!(row.to_vec(), vec![0, 5, 0, 7]);
}
