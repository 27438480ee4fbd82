//! Row-major <-> column-major transpose of the dense per-target matrices.
//!
//! The assembly and basis-evaluation stages build everything in row-major
//! order (one row per neighbor), but the batched QR/SVD kernels in
//! `gmls-linalg` are written against LAPACK's column-major convention.
//! Rather than thread two index conventions through every kernel, the
//! orchestrator calls [`transpose_into`] once per target to materialize a
//! column-major copy in scratch. Blocked for cache locality, but
//! generalized to the rectangular, non-power-of-two shapes GMLS actually
//! produces (`height` is the neighbor count, `width` the basis size, and
//! the two rarely match, let alone both being a power of two).

use crate::matrix::{MatrixView, MatrixViewMut};

const BLOCK_SIZE: usize = 16;

/// Copies `src` (row-major, `height x width`) into `dst` (column-major,
/// i.e. `dst[(j, i)] == src[(i, j)]`, stored as a `width x height`
/// row-major buffer). Blocked for cache locality; correct for any
/// `height`/`width`, not just powers of two.
pub fn transpose_into(src: MatrixView<'_>, dst: &mut MatrixViewMut<'_>) {
    let height = src.height();
    let width = src.width();
    assert_eq!(dst.height(), width, "transpose target has wrong height");
    assert_eq!(dst.width(), height, "transpose target has wrong width");

    let mut bi = 0;
    while bi < height {
        let i_end = (bi + BLOCK_SIZE).min(height);
        let mut bj = 0;
        while bj < width {
            let j_end = (bj + BLOCK_SIZE).min(width);
            for i in bi..i_end {
                let row = src.row(i);
                for j in bj..j_end {
                    dst.set(j, i, row[j]);
                }
            }
            bj = j_end;
        }
        bi = i_end;
    }
}

/// Transposes a square matrix in place by swapping across the diagonal.
pub fn transpose_square_in_place(view: &mut MatrixViewMut<'_>) {
    let n = view.height();
    assert_eq!(n, view.width(), "transpose_square_in_place needs a square view");
    for i in 0..n {
        for j in (i + 1)..n {
            let a = view.get(i, j);
            let b = view.get(j, i);
            view.set(i, j, b);
            view.set(j, i, a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_rectangular() {
        // 2x3 -> 3x2
        let src_data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let src = MatrixView::new(&src_data, 2, 3);
        let mut dst_data = vec![0.0; 6];
        let mut dst = MatrixViewMut::new(&mut dst_data, 3, 2);
        transpose_into(src, &mut dst);
        assert_eq!(dst.row(0), &[1.0, 4.0]);
        assert_eq!(dst.row(1), &[2.0, 5.0]);
        assert_eq!(dst.row(2), &[3.0, 6.0]);
    }

    #[test]
    fn transpose_bigger_than_one_block() {
        let n = BLOCK_SIZE * 2 + 3;
        let m = BLOCK_SIZE + 1;
        let src_data: Vec<f64> = (0..n * m).map(|x| x as f64).collect();
        let src = MatrixView::new(&src_data, n, m);
        let mut dst_data = vec![0.0; n * m];
        let mut dst = MatrixViewMut::new(&mut dst_data, m, n);
        transpose_into(src, &mut dst);
        for i in 0..n {
            for j in 0..m {
                assert_eq!(dst.get(j, i), src.get(i, j));
            }
        }
    }

    #[test]
    fn square_in_place_matches_round_trip() {
        let mut data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let original = data.clone();
        let mut view = MatrixViewMut::new(&mut data, 3, 3);
        transpose_square_in_place(&mut view);
        transpose_square_in_place(&mut view);
        assert_eq!(data, original);
    }
}
