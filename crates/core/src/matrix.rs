//! Dense row-major matrix type and submission-time validation.
//!
//! [`Matrix`] serializes as a JSON array of rows (`[[1, 2], [3, 4]]`) and
//! refuses to deserialize anything that is not a non-empty, rectangular,
//! finite-numeric grid.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A dense `rows x cols` matrix of finite `f64` values, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Build a matrix from a flat row-major buffer.
    ///
    /// Fails when either dimension is zero, when `data.len() != rows * cols`,
    /// or when any value is NaN or infinite.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, CoreError> {
        if rows == 0 || cols == 0 {
            return Err(CoreError::Validation(
                "Matrix must have at least one row and one column".to_string(),
            ));
        }
        if data.len() != rows * cols {
            return Err(CoreError::Validation(format!(
                "Matrix buffer holds {} values, expected {rows} x {cols}",
                data.len()
            )));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(CoreError::Validation(format!(
                "Non-finite value at row {}, column {}",
                pos / cols,
                pos % cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from nested rows, checking that every row has the
    /// same length as the first.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, CoreError> {
        let row_count = rows.len();
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(row_count * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(CoreError::Validation(format!(
                    "Row {i} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Self::new(row_count, cols, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; a `Matrix` cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at `(row, col)`. Panics when out of bounds, like slice indexing.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Iterate over rows as slices.
    pub fn row_iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.cols)
    }

    /// Copy into nested rows.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.row_iter().map(<[f64]>::to_vec).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
    type Error = CoreError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<Matrix> for Vec<Vec<f64>> {
    fn from(m: Matrix) -> Self {
        m.to_rows()
    }
}

/// Validate that `a x b` is a defined product (`cols(A) == rows(B)`).
pub fn validate_product_shapes(a: &Matrix, b: &Matrix) -> Result<(), CoreError> {
    if a.cols() != b.rows() {
        return Err(CoreError::Validation(format!(
            "Incompatible dimensions: A is {} x {}, B is {} x {}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
