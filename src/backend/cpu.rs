//! Reference kernels. Every routine reads and writes flat buffers through
//! [`Plane`] descriptors and accumulates into the destination (`+=`).

use crate::tensor::Float;

/// A strided 2-D window into a flat buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plane {
    pub offset: usize,
    pub rows: usize,
    pub cols: usize,
    pub row_stride: isize,
    pub col_stride: isize,
}

impl Plane {
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> usize {
        (self.offset as isize + row as isize * self.row_stride + col as isize * self.col_stride)
            as usize
    }

    /// Row-major with unit column stride, so rows can be split into disjoint slices.
    pub fn is_dense(&self) -> bool {
        self.col_stride == 1 && (self.rows <= 1 || self.row_stride == self.cols as isize)
    }
}

/// `c += a · b`
pub(crate) fn matmul<T: Float>(a: &[T], la: Plane, b: &[T], lb: Plane, c: &mut [T], lc: Plane) {
    for i in 0..la.rows {
        matmul_row(a, la, b, lb, i, |j, value| c[lc.at(i, j)] += value);
    }
}

/// Accumulates row `i` of `a · b`, one output column at a time.
#[inline]
pub(crate) fn matmul_row<T: Float>(
    a: &[T],
    la: Plane,
    b: &[T],
    lb: Plane,
    i: usize,
    mut write: impl FnMut(usize, T),
) {
    for j in 0..lb.cols {
        let mut sum = T::zero();
        for p in 0..la.cols {
            sum += a[la.at(i, p)] * b[lb.at(p, j)];
        }
        write(j, sum);
    }
}

/// Valid cross-correlation: `dst[i,j] += Σ x[i+l, j+m] * k[l,m]`.
pub(crate) fn corr2d<T: Float>(x: &[T], lx: Plane, k: &[T], lk: Plane, dst: &mut [T], ld: Plane) {
    for i in 0..ld.rows {
        corr2d_row(x, lx, k, lk, ld.cols, i, |j, value| dst[ld.at(i, j)] += value);
    }
}

#[inline]
pub(crate) fn corr2d_row<T: Float>(
    x: &[T],
    lx: Plane,
    k: &[T],
    lk: Plane,
    out_cols: usize,
    i: usize,
    mut write: impl FnMut(usize, T),
) {
    for j in 0..out_cols {
        let mut sum = T::zero();
        for l in 0..lk.rows {
            for m in 0..lk.cols {
                sum += x[lx.at(i + l, j + m)] * k[lk.at(l, m)];
            }
        }
        write(j, sum);
    }
}

/// Valid convolution, the kernel flipped on both spatial axes.
pub(crate) fn conv2d<T: Float>(x: &[T], lx: Plane, k: &[T], lk: Plane, dst: &mut [T], ld: Plane) {
    for i in 0..ld.rows {
        for j in 0..ld.cols {
            let mut sum = T::zero();
            for l in 0..lk.rows {
                for m in 0..lk.cols {
                    let tap = k[lk.at(lk.rows - 1 - l, lk.cols - 1 - m)];
                    sum += x[lx.at(i + l, j + m)] * tap;
                }
            }
            dst[ld.at(i, j)] += sum;
        }
    }
}

/// Zero-padded full convolution: `dst[i,j] += Σ k[m,n] * x[i-m, j-n]` over in-range taps.
pub(crate) fn conv2d_full<T: Float>(
    x: &[T],
    lx: Plane,
    k: &[T],
    lk: Plane,
    dst: &mut [T],
    ld: Plane,
) {
    for i in 0..ld.rows {
        conv2d_full_row(x, lx, k, lk, ld.cols, i, |j, value| dst[ld.at(i, j)] += value);
    }
}

#[inline]
pub(crate) fn conv2d_full_row<T: Float>(
    x: &[T],
    lx: Plane,
    k: &[T],
    lk: Plane,
    out_cols: usize,
    i: usize,
    mut write: impl FnMut(usize, T),
) {
    // taps with i - m inside [0, rows) only
    let m_start = (i + 1).saturating_sub(lx.rows);
    let m_end = lk.rows.min(i + 1);
    for j in 0..out_cols {
        let n_start = (j + 1).saturating_sub(lx.cols);
        let n_end = lk.cols.min(j + 1);
        let mut sum = T::zero();
        for m in m_start..m_end {
            for n in n_start..n_end {
                sum += k[lk.at(m, n)] * x[lx.at(i - m, j - n)];
            }
        }
        write(j, sum);
    }
}

/// Pooling window geometry shared by the max and average kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub filter: (usize, usize),
    pub stride: (usize, usize),
}

impl Window {
    /// Input rows and columns covered by output cell `(i, j)`, clamped to the input.
    #[inline]
    fn bounds(&self, input: Plane, i: usize, j: usize) -> (usize, usize, usize, usize) {
        let row_start = i * self.stride.0;
        let col_start = j * self.stride.1;
        (
            row_start,
            (row_start + self.filter.0).min(input.rows),
            col_start,
            (col_start + self.filter.1).min(input.cols),
        )
    }

    /// Position of the first maximum in row-major scan order.
    #[inline]
    fn argmax<T: Float>(&self, x: &[T], lx: Plane, i: usize, j: usize) -> (usize, usize) {
        let (r0, r1, c0, c1) = self.bounds(lx, i, j);
        let mut best = T::neg_infinity();
        let mut winner = (r0, c0);
        for r in r0..r1 {
            for c in c0..c1 {
                let value = x[lx.at(r, c)];
                if value > best {
                    best = value;
                    winner = (r, c);
                }
            }
        }
        winner
    }
}

pub(crate) fn max_pool2d<T: Float>(x: &[T], lx: Plane, window: Window, dst: &mut [T], ld: Plane) {
    for i in 0..ld.rows {
        for j in 0..ld.cols {
            let (r, c) = window.argmax(x, lx, i, j);
            dst[ld.at(i, j)] += x[lx.at(r, c)];
        }
    }
}

/// Routes each output gradient to the input cell that won its window.
pub(crate) fn max_pool2d_backward<T: Float>(
    x: &[T],
    lx: Plane,
    grad: &[T],
    lg: Plane,
    window: Window,
    dst: &mut [T],
    ld: Plane,
) {
    for i in 0..lg.rows {
        for j in 0..lg.cols {
            let (r, c) = window.argmax(x, lx, i, j);
            dst[ld.at(r, c)] += grad[lg.at(i, j)];
        }
    }
}

/// Average over the taps actually visited.
pub(crate) fn avg_pool2d<T: Float>(x: &[T], lx: Plane, window: Window, dst: &mut [T], ld: Plane) {
    for i in 0..ld.rows {
        for j in 0..ld.cols {
            let (r0, r1, c0, c1) = window.bounds(lx, i, j);
            let mut sum = T::zero();
            for r in r0..r1 {
                for c in c0..c1 {
                    sum += x[lx.at(r, c)];
                }
            }
            let count = ((r1 - r0) * (c1 - c0)).max(1);
            dst[ld.at(i, j)] += sum / T::lit(count as f64);
        }
    }
}

/// Spreads `g / (fh * fw)` over each window. `ld` describes the input-shaped destination.
pub(crate) fn avg_pool2d_backward<T: Float>(
    grad: &[T],
    lg: Plane,
    window: Window,
    dst: &mut [T],
    ld: Plane,
) {
    let area = T::lit((window.filter.0 * window.filter.1) as f64);
    for i in 0..lg.rows {
        for j in 0..lg.cols {
            let share = grad[lg.at(i, j)] / area;
            let (r0, r1, c0, c1) = window.bounds(ld, i, j);
            for r in r0..r1 {
                for c in c0..c1 {
                    dst[ld.at(r, c)] += share;
                }
            }
        }
    }
}
