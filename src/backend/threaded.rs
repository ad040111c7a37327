//! Row-parallel versions of the heavy kernels. Each output row is produced by
//! the same per-row routine as the reference kernels, so results match them
//! exactly. Destinations that are not dense row-major fall back to the
//! reference path.

use rayon::prelude::*;

use super::cpu::{self, Plane};
use crate::tensor::Float;

/// The destination window as one flat slice of whole rows, when it can be split.
fn dense_rows<T>(dst: &mut [T], ld: Plane) -> Option<&mut [T]> {
    if !ld.is_dense() || ld.rows < 2 || ld.cols == 0 {
        return None;
    }
    Some(&mut dst[ld.offset..ld.offset + ld.rows * ld.cols])
}

pub(crate) fn matmul<T: Float>(a: &[T], la: Plane, b: &[T], lb: Plane, c: &mut [T], lc: Plane) {
    match dense_rows(c, lc) {
        Some(rows) => rows
            .par_chunks_mut(lc.cols)
            .enumerate()
            .for_each(|(i, row)| cpu::matmul_row(a, la, b, lb, i, |j, value| row[j] += value)),
        None => cpu::matmul(a, la, b, lb, c, lc),
    }
}

pub(crate) fn corr2d<T: Float>(x: &[T], lx: Plane, k: &[T], lk: Plane, dst: &mut [T], ld: Plane) {
    match dense_rows(dst, ld) {
        Some(rows) => rows
            .par_chunks_mut(ld.cols)
            .enumerate()
            .for_each(|(i, row)| {
                cpu::corr2d_row(x, lx, k, lk, ld.cols, i, |j, value| row[j] += value)
            }),
        None => cpu::corr2d(x, lx, k, lk, dst, ld),
    }
}

pub(crate) fn conv2d_full<T: Float>(
    x: &[T],
    lx: Plane,
    k: &[T],
    lk: Plane,
    dst: &mut [T],
    ld: Plane,
) {
    match dense_rows(dst, ld) {
        Some(rows) => rows
            .par_chunks_mut(ld.cols)
            .enumerate()
            .for_each(|(i, row)| {
                cpu::conv2d_full_row(x, lx, k, lk, ld.cols, i, |j, value| row[j] += value)
            }),
        None => cpu::conv2d_full(x, lx, k, lk, dst, ld),
    }
}
