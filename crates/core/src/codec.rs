//! Matrix interchange text format shared with the external compute binaries.
//!
//! ```text
//! <rows> <cols>
//! v11 v12 ... v1c
//! ...
//! vr1 vr2 ... vrc
//! ```
//!
//! The binaries read inputs with `fscanf` and write results with a
//! fixed-width `printf`, so this module is the only place where the layout
//! is defined.

use std::fmt::Write as _;
use std::path::Path;

use crate::matrix::Matrix;

/// Fractional digits used for non-integral values.
pub const FRACTION_DIGITS: usize = 6;

/// How numeric tokens are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    /// Integral values without a fractional part, others with
    /// [`FRACTION_DIGITS`] digits.
    Compact,
    /// Every value with exactly [`FRACTION_DIGITS`] digits.
    Fixed,
}

/// Errors raised while decoding interchange text.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("missing header line")]
    MissingHeader,

    #[error("malformed header: {0:?}")]
    MalformedHeader(String),

    #[error("header declares a zero dimension ({rows} x {cols})")]
    ZeroDimension { rows: usize, cols: usize },

    #[error("expected {expected} rows, found {found}")]
    RowCount { expected: usize, found: usize },

    #[error("row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}, column {col}: invalid number {token:?}")]
    InvalidNumber { row: usize, col: usize, token: String },
}

/// Errors raised by the file helpers.
#[derive(Debug, thiserror::Error)]
pub enum MatrixFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: CodecError,
    },
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode with [`NumberFormat::Compact`].
pub fn encode(matrix: &Matrix) -> String {
    encode_with(matrix, NumberFormat::Compact)
}

/// Encode with the given number format. Output always ends with `\n`.
pub fn encode_with(matrix: &Matrix, format: NumberFormat) -> String {
    // Rough per-token estimate keeps reallocations down for large inputs.
    let mut out = String::with_capacity(16 + matrix.len() * (FRACTION_DIGITS + 4));
    let _ = writeln!(out, "{} {}", matrix.rows(), matrix.cols());
    for row in matrix.row_iter() {
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                out.push(' ');
            }
            write_value(&mut out, *value, format);
        }
        out.push('\n');
    }
    out
}

fn write_value(out: &mut String, value: f64, format: NumberFormat) {
    let integral = value.fract() == 0.0 && value.abs() < 1e15;
    match format {
        NumberFormat::Compact if integral => {
            let _ = write!(out, "{}", value as i64);
        }
        _ => {
            let _ = write!(out, "{value:.prec$}", prec = FRACTION_DIGITS);
        }
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode interchange text into a [`Matrix`].
///
/// Blank lines after the header are ignored; every other line must carry
/// exactly `cols` finite numbers and there must be exactly `rows` of them.
pub fn decode(text: &str) -> Result<Matrix, CodecError> {
    let mut lines = text.lines();
    let header = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or(CodecError::MissingHeader)?;
    let (rows, cols) = parse_header(header)?;

    let mut data = Vec::with_capacity(rows * cols);
    let mut found = 0usize;
    for line in lines.filter(|l| !l.trim().is_empty()) {
        if found == rows {
            found += 1;
            continue;
        }
        let before = data.len();
        for (col, token) in line.split_whitespace().enumerate() {
            if col >= cols {
                return Err(CodecError::ColumnCount {
                    row: found,
                    expected: cols,
                    found: line.split_whitespace().count(),
                });
            }
            data.push(parse_number(token).ok_or_else(|| CodecError::InvalidNumber {
                row: found,
                col,
                token: token.to_string(),
            })?);
        }
        let width = data.len() - before;
        if width != cols {
            return Err(CodecError::ColumnCount {
                row: found,
                expected: cols,
                found: width,
            });
        }
        found += 1;
    }
    if found != rows {
        return Err(CodecError::RowCount {
            expected: rows,
            found,
        });
    }

    // Shape and finiteness are already guaranteed above.
    Matrix::new(rows, cols, data).map_err(|_| CodecError::ZeroDimension { rows, cols })
}

fn parse_header(line: &str) -> Result<(usize, usize), CodecError> {
    let malformed = || CodecError::MalformedHeader(line.trim().to_string());
    let mut parts = line.split_whitespace();
    let rows = parts.next().and_then(|t| t.parse().ok()).ok_or_else(malformed)?;
    let cols = parts.next().and_then(|t| t.parse().ok()).ok_or_else(malformed)?;
    if parts.next().is_some() {
        return Err(malformed());
    }
    if rows == 0 || cols == 0 {
        return Err(CodecError::ZeroDimension { rows, cols });
    }
    Ok((rows, cols))
}

fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Encode `matrix` and write it to `path`.
pub async fn write_matrix_file(
    path: &Path,
    matrix: &Matrix,
    format: NumberFormat,
) -> Result<(), MatrixFileError> {
    tokio::fs::write(path, encode_with(matrix, format))
        .await
        .map_err(|source| MatrixFileError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Read `path` and decode it.
pub async fn read_matrix_file(path: &Path) -> Result<Matrix, MatrixFileError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| MatrixFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
    decode(&text).map_err(|source| MatrixFileError::Parse {
        path: path.display().to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
