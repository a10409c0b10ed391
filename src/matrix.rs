use crate::{FitError, FitResult};
use core::ops::Index;

/// Borrowed row of a column-major matrix: the item at `start`, then one every `stride`.
pub struct StridedVecView<'a, A: 'a> {
    pub data: &'a [A],
    pub start: usize,
    pub stride: usize,
}

impl<'a, A: 'a> StridedVecView<'a, A> {
    pub fn new(data: &'a [A], start: usize, stride: usize) -> Self {
        Self {
            data,
            start,
            stride,
        }
    }

    /// Number of items in the view.
    pub fn len(&self) -> usize {
        self.data.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, A: 'a> Index<usize> for StridedVecView<'a, A> {
    type Output = A;
    fn index(&self, pos: usize) -> &A {
        &self.data[self.start + pos * self.stride]
    }
}

impl<'a, A: 'a> StridedVecView<'a, A> {
    pub fn iter<'b>(&'b self) -> impl Iterator<Item = &'b A> + 'b {
        (0..self.len()).map(move |pos| &self[pos])
    }
}

impl<'a, A: 'a + Clone> StridedVecView<'a, A> {
    pub fn to_vec(&self) -> Vec<A> {
        self.iter().cloned().collect()
    }
}

/// Store a dense matrix in a column-major way.
///
/// The split search reads one column at a time, so this is the layout for the interpolating
/// features. The bridge features use it too, so a single type crosses the public API.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMajorMatrix<A> {
    /// Number of rows in the matrix
    n_rows: usize,
    /// Number of columns in the matrix
    n_cols: usize,
    /// Values, column after column
    values: Vec<A>,
}

impl<A> ColumnMajorMatrix<A> {
    /// Build the matrix from its columns. All the columns must have the same length.
    pub fn from_columns(columns: Vec<Vec<A>>) -> FitResult<Self> {
        let n_cols = columns.len();
        let n_rows = match columns.first() {
            Some(column) => column.len(),
            None => return Err(FitError::EmptyInput("matrix without columns".to_string())),
        };
        if n_rows == 0 {
            return Err(FitError::EmptyInput("matrix without rows".to_string()));
        }
        let mut values = Vec::with_capacity(n_rows * n_cols);
        for (n_col, column) in columns.into_iter().enumerate() {
            if column.len() != n_rows {
                return Err(FitError::ShapeMismatch(format!(
                    "column {} has {} rows, expected {}",
                    n_col,
                    column.len(),
                    n_rows
                )));
            }
            values.extend(column);
        }
        Ok(Self {
            n_rows,
            n_cols,
            values,
        })
    }

    /// Build the matrix from its rows. All the rows must have the same width.
    pub fn from_rows(rows: Vec<Vec<A>>) -> FitResult<Self> {
        let n_rows = rows.len();
        let n_cols = match rows.first() {
            Some(row) => row.len(),
            None => return Err(FitError::EmptyInput("matrix without rows".to_string())),
        };
        for (n_row, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(FitError::ShapeMismatch(format!(
                    "row {} has {} columns, expected {}",
                    n_row,
                    row.len(),
                    n_cols
                )));
            }
        }
        let mut rows: Vec<_> = rows.into_iter().map(|row| row.into_iter()).collect();
        let mut values: Vec<A> = Vec::with_capacity(n_rows * n_cols);
        for _ in 0..n_cols {
            for row in &mut rows {
                if let Some(item) = row.next() {
                    values.push(item)
                }
            }
        }
        debug_assert_eq!(n_rows * n_cols, values.len());
        Ok(Self {
            n_rows,
            n_cols,
            values,
        })
    }

    pub fn column(&self, col: usize) -> &[A] {
        let start = col * self.n_rows;
        &self.values[start..start + self.n_rows]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[A]> {
        self.values.chunks(self.n_rows.max(1)).take(self.n_cols)
    }

    pub fn row(&self, row: usize) -> StridedVecView<A> {
        StridedVecView::new(&self.values, row, self.n_rows)
    }

    pub fn flat(&self) -> &[A] {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }
}

impl<A: Clone> ColumnMajorMatrix<A> {
    /// Copy of the rows where `mask` is true, in their original order.
    pub(crate) fn select_rows(&self, mask: &[bool]) -> Self {
        debug_assert_eq!(mask.len(), self.n_rows);
        let n_rows = mask.iter().filter(|&&keep| keep).count();
        let mut values = Vec::with_capacity(n_rows * self.n_cols);
        for column in self.columns() {
            values.extend(
                column
                    .iter()
                    .zip(mask)
                    .filter(|(_, &keep)| keep)
                    .map(|(val, _)| val.clone()),
            );
        }
        Self {
            n_rows,
            n_cols: self.n_cols,
            values,
        }
    }
}

impl<A> Index<(usize, usize)> for ColumnMajorMatrix<A> {
    type Output = A;
    fn index(&self, (row, col): (usize, usize)) -> &A {
        // A column past the end is caught by the slice bound check
        debug_assert!(row < self.n_rows);
        &self.values[row + col * self.n_rows]
    }
}
