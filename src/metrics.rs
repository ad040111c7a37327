//! Classification metrics over paired predictions and labels.
//!
//! Each prediction and label is one sample. The class of a sample is the index
//! of its largest entry; single-output samples are thresholded at one half.

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::tensor::{Float, Tensor};

fn class_of<T: Float>(sample: &Tensor<T>) -> Result<usize> {
    if sample.len() == 1 {
        return Ok(usize::from(sample.first()? >= T::lit(0.5)));
    }
    sample.argmax()
}

fn classes<T: Float>(preds: &[Tensor<T>], reals: &[Tensor<T>]) -> Result<Vec<(usize, usize)>> {
    if preds.is_empty() {
        return Err(Error::EmptyDataset);
    }
    if preds.len() != reals.len() {
        return Err(Error::LengthMismatch {
            context: "metric labels",
            expected: preds.len(),
            actual: reals.len(),
        });
    }
    preds
        .iter()
        .zip_eq(reals)
        .map(|(pred, real)| {
            pred.expect_shape("metric sample", preds[0].shape())?;
            pred.check_same_shape("metric sample", real)?;
            Ok((class_of(real)?, class_of(pred)?))
        })
        .collect()
}

/// Fraction of samples whose predicted class matches the label.
pub fn accuracy<T: Float>(preds: &[Tensor<T>], reals: &[Tensor<T>]) -> Result<f64> {
    let pairs = classes(preds, reals)?;
    let hits = pairs.iter().filter(|(real, pred)| real == pred).count();
    Ok(hits as f64 / pairs.len() as f64)
}

/// `matrix[real][predicted]` counts.
pub fn confusion_matrix<T: Float>(preds: &[Tensor<T>], reals: &[Tensor<T>]) -> Result<Vec<Vec<usize>>> {
    let pairs = classes(preds, reals)?;
    let n = match preds[0].len() {
        1 => 2,
        len => len,
    };
    let mut matrix = vec![vec![0; n]; n];
    for (real, pred) in pairs {
        matrix[real][pred] += 1;
    }
    Ok(matrix)
}

/// Macro-averaged F1. Classes with no predictions and no labels score zero.
pub fn f1_score<T: Float>(preds: &[Tensor<T>], reals: &[Tensor<T>]) -> Result<f64> {
    let matrix = confusion_matrix(preds, reals)?;
    let n = matrix.len();
    let total: f64 = (0..n)
        .map(|class| {
            let hits = matrix[class][class] as f64;
            let predicted: usize = (0..n).map(|real| matrix[real][class]).sum();
            let labelled: usize = matrix[class].iter().sum();
            let precision = if predicted > 0 { hits / predicted as f64 } else { 0.0 };
            let recall = if labelled > 0 { hits / labelled as f64 } else { 0.0 };
            if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            }
        })
        .sum();
    Ok(total / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(class: usize) -> Tensor<f64> {
        let t = Tensor::zeros(&[3]);
        t.set(&[class], 1.0).unwrap();
        t
    }

    #[test]
    fn test_accuracy_and_confusion() {
        let preds = vec![
            Tensor::from([0.7, 0.2, 0.1]),
            Tensor::from([0.1, 0.8, 0.1]),
            Tensor::from([0.5, 0.4, 0.1]),
            Tensor::from([0.1, 0.1, 0.8]),
        ];
        let reals = vec![one_hot(0), one_hot(1), one_hot(1), one_hot(2)];
        assert_eq!(accuracy(&preds, &reals).unwrap(), 0.75);
        let matrix = confusion_matrix(&preds, &reals).unwrap();
        assert_eq!(matrix, vec![vec![1, 0, 0], vec![1, 1, 0], vec![0, 0, 1]]);
        // class 0: p 1/2 r 1, class 1: p 1 r 1/2, class 2: 1
        let f1 = f1_score(&preds, &reals).unwrap();
        assert!((f1 - (2.0 / 3.0 + 2.0 / 3.0 + 1.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_binary_threshold() {
        let preds = vec![Tensor::from([0.9]), Tensor::from([0.2])];
        let reals = vec![Tensor::from([1.0]), Tensor::from([1.0])];
        assert_eq!(accuracy(&preds, &reals).unwrap(), 0.5);
        assert_eq!(
            confusion_matrix(&preds, &reals).unwrap(),
            vec![vec![0, 0], vec![1, 1]]
        );
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        let empty: Vec<Tensor<f64>> = vec![];
        assert_eq!(accuracy(&empty, &empty).unwrap_err(), Error::EmptyDataset);
        assert!(accuracy(&[one_hot(0)], &[]).is_err());
    }
}
