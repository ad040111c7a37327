use crate::error::{Error, Result};

fn plane(context: &'static str, shape: &[usize]) -> Result<(usize, usize)> {
    match shape {
        &[rows, cols] => Ok((rows, cols)),
        _ => Err(Error::invalid_shape(context, shape, "expected a rank 2 plane")),
    }
}

/// Output shape of a "valid" correlation or convolution: `(h - kh + 1, w - kw + 1)`.
pub fn corr_output_shape(input: &[usize], kernel: &[usize]) -> Result<[usize; 2]> {
    let (h, w) = plane("correlation input", input)?;
    let (kh, kw) = plane("correlation kernel", kernel)?;
    if kh == 0 || kw == 0 || kh > h || kw > w {
        return Err(Error::invalid_shape(
            "correlation kernel",
            kernel,
            &format!("kernel must be non-empty and fit inside an input of shape {input:?}"),
        ));
    }
    Ok([h - kh + 1, w - kw + 1])
}

/// Output shape of a zero-padded "full" convolution: `(h + kh - 1, w + kw - 1)`.
pub fn full_output_shape(input: &[usize], kernel: &[usize]) -> Result<[usize; 2]> {
    let (h, w) = plane("full convolution input", input)?;
    let (kh, kw) = plane("full convolution kernel", kernel)?;
    if h == 0 || w == 0 || kh == 0 || kw == 0 {
        return Err(Error::invalid_shape(
            "full convolution",
            kernel,
            &format!("input {input:?} and kernel must both be non-empty"),
        ));
    }
    Ok([h + kh - 1, w + kw - 1])
}

/// Pooling output per spatial axis: `floor((in - filter) / stride) + 1`.
pub fn pool_output_shape(
    input: &[usize],
    filter: (usize, usize),
    stride: (usize, usize),
) -> Result<[usize; 2]> {
    let (h, w) = plane("pooling input", input)?;
    if filter.0 == 0 || filter.1 == 0 || stride.0 == 0 || stride.1 == 0 {
        return Err(Error::InvalidParameter(format!(
            "pooling filter {filter:?} and stride {stride:?} must be positive"
        )));
    }
    if filter.0 > h || filter.1 > w {
        return Err(Error::invalid_shape(
            "pooling input",
            input,
            &format!("filter {filter:?} does not fit"),
        ));
    }
    Ok([(h - filter.0) / stride.0 + 1, (w - filter.1) / stride.1 + 1])
}

/// `[k] x [k, n] -> [n]` or `[m, k] x [k, n] -> [m, n]`.
pub fn matmul_output_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let (inner, cols) = plane("matmul right operand", b)?;
    let (rows, a_inner) = match a {
        &[k] => (None, k),
        &[m, k] => (Some(m), k),
        _ => {
            return Err(Error::invalid_shape(
                "matmul left operand",
                a,
                "expected rank 1 or 2",
            ))
        }
    };
    if a_inner != inner {
        return Err(Error::shape_mismatch(
            "matmul inner dimension",
            &[a_inner, cols],
            b,
        ));
    }
    Ok(match rows {
        Some(m) => vec![m, cols],
        None => vec![cols],
    })
}

#[test]
fn test_corr_output_shape() {
    assert_eq!(corr_output_shape(&[3, 3], &[2, 2]).unwrap(), [2, 2]);
    assert_eq!(corr_output_shape(&[28, 28], &[3, 5]).unwrap(), [26, 24]);
    assert!(corr_output_shape(&[2, 2], &[3, 1]).is_err());
}

#[test]
fn test_pool_output_shape_floors() {
    assert_eq!(pool_output_shape(&[5, 5], (2, 2), (2, 2)).unwrap(), [2, 2]);
    assert_eq!(pool_output_shape(&[6, 7], (3, 2), (1, 3)).unwrap(), [4, 2]);
    assert!(pool_output_shape(&[4, 4], (0, 2), (1, 1)).is_err());
}

#[test]
fn test_matmul_output_shape() {
    assert_eq!(matmul_output_shape(&[3], &[3, 4]).unwrap(), vec![4]);
    assert_eq!(matmul_output_shape(&[2, 3], &[3, 4]).unwrap(), vec![2, 4]);
    assert!(matmul_output_shape(&[2, 2], &[3, 4]).is_err());
}
