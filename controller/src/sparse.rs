//! Triplet accumulation for the sparse matrices handed to the QP solver.

use std::borrow::Cow;

use itertools::Itertools;
use osqp::CscMatrix;

use prelude::*;

/// Collects (row, column, value) coordinates and assembles them into
/// compressed sparse column form. Duplicate cells are summed.
#[derive(Clone, Debug)]
pub struct Builder {
    coords: Vec<(usize, usize, float)>,
    nrows: usize,
    ncols: usize,
}

impl Builder {
    pub fn with_capacity(nrows: usize, ncols: usize, nnz: usize) -> Builder {
        Builder {
            coords: Vec::with_capacity(nnz),
            nrows,
            ncols,
        }
    }

    pub fn set(&mut self, row: usize, col: usize, val: float) {
        assert!(row < self.nrows && col < self.ncols);
        if val != 0.0 {
            self.coords.push((row, col, val));
        }
    }

    pub fn build_csc(mut self) -> CscMatrix<'static> {
        // Sort and sum any duplicates in the same cell
        self.coords.sort_unstable_by_key(|&(r, c, _)| (c, r));
        let coords = self
            .coords
            .into_iter()
            .coalesce(|l, r| {
                if l.0 == r.0 && l.1 == r.1 {
                    Ok((l.0, l.1, l.2 + r.2))
                } else {
                    Err((l, r))
                }
            })
            .collect::<Vec<_>>();

        let mut indptr = vec![0; self.ncols + 1];
        let mut indices = vec![0; coords.len()];
        let mut data = vec![0.0; coords.len()];

        // Fill in the CSC column start pointers and row indices
        let mut last_c = 0;
        for (i, &(r, c, val)) in coords.iter().enumerate() {
            while last_c < c {
                last_c += 1;
                indptr[last_c] = i;
            }
            indices[i] = r;
            data[i] = val;
        }
        // Point the remaining columns one past the end of the data array
        while last_c < self.ncols {
            last_c += 1;
            indptr[last_c] = coords.len();
        }

        CscMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr: Cow::Owned(indptr),
            indices: Cow::Owned(indices),
            data: Cow::Owned(data),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn to_dense(m: &CscMatrix) -> Vec<Vec<float>> {
        let mut dense = vec![vec![0.0; m.ncols]; m.nrows];
        for c in 0..m.ncols {
            for i in m.indptr[c]..m.indptr[c + 1] {
                dense[m.indices[i]][c] = m.data[i];
            }
        }
        dense
    }

    #[test]
    fn duplicate_cells_are_summed() {
        let mut b = Builder::with_capacity(2, 2, 3);
        b.set(0, 0, 1.5);
        b.set(1, 1, 2.0);
        b.set(0, 0, 0.5);
        let m = b.build_csc();
        assert_eq!(to_dense(&m), vec![vec![2.0, 0.0], vec![0.0, 2.0]]);
        assert_eq!(m.data.len(), 2);
    }

    #[test]
    fn empty_columns_get_valid_pointers() {
        let mut b = Builder::with_capacity(3, 4, 2);
        b.set(2, 1, 7.0);
        b.set(0, 1, 3.0);
        let m = b.build_csc();
        assert_eq!(m.indptr.as_ref(), [0, 0, 2, 2, 2]);
        assert_eq!(m.indices.as_ref(), [0, 2]);
        assert_eq!(m.data.as_ref(), [3.0, 7.0]);
    }

    #[test]
    fn rows_within_a_column_are_ascending() {
        let mut b = Builder::with_capacity(4, 1, 3);
        b.set(3, 0, 1.0);
        b.set(0, 0, 2.0);
        b.set(2, 0, 3.0);
        let m = b.build_csc();
        assert_eq!(m.indices.as_ref(), [0, 2, 3]);
        assert_eq!(m.data.as_ref(), [2.0, 3.0, 1.0]);
    }

    #[test]
    fn zero_values_are_dropped() {
        let mut b = Builder::with_capacity(2, 2, 2);
        b.set(0, 0, 0.0);
        b.set(1, 0, 4.0);
        let m = b.build_csc();
        assert_eq!(m.data.len(), 1);
        assert_eq!(to_dense(&m)[1][0], 4.0);
    }
}
