//! Deterministic benchmark inputs.
//!
//! Two independent 32-bit linear-congruential streams are derived from
//! `(seed, n)`; stream A fills matrix A and stream B fills matrix B. Values
//! are rounded to six fractional digits in integer arithmetic so the encoded
//! text is identical on every platform. Generated files carry no trailing
//! newline.

use std::path::{Path, PathBuf};

use crate::codec::{self, MatrixFileError, NumberFormat};
use crate::matrix::Matrix;

/// LCG multiplier (Numerical Recipes).
pub const LCG_MULTIPLIER: u32 = 1_664_525;
/// LCG increment.
pub const LCG_INCREMENT: u32 = 1_013_904_223;
/// Knuth's multiplicative hash constant, mixes `n` into seed A.
pub const SEED_A_MIX: u32 = 2_654_435_761;
/// Golden-ratio constant, mixes seed B.
pub const SEED_B_MIX: u32 = 0x9e37_79b9;

const MODULUS: u64 = 1 << 32;
const MICROS: u64 = 1_000_000;

/// 32-bit linear-congruential generator (`state = a * state + c mod 2^32`).
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advance and return the raw 32-bit state.
    pub fn next_raw(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }

    /// Advance and return `state / 2^32`, in `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        self.next_raw() as f64 / MODULUS as f64
    }

    /// Advance and return `state / 2^32` rounded half-up to six fractional
    /// digits.
    pub fn next_micro_rounded(&mut self) -> f64 {
        let scaled = self.next_raw() as u64 * MICROS;
        let mut micros = scaled >> 32;
        if (scaled & (MODULUS - 1)) * 2 >= MODULUS {
            micros += 1;
        }
        micros as f64 / MICROS as f64
    }
}

/// Seed for the A stream: `seed ^ (n * 2654435761) mod 2^32`.
pub fn seed_a(seed: u32, n: u32) -> u32 {
    seed ^ n.wrapping_mul(SEED_A_MIX)
}

/// Seed for the B stream: `(seed + n) mod 2^32 ^ 0x9e3779b9`.
pub fn seed_b(seed: u32, n: u32) -> u32 {
    seed.wrapping_add(n) ^ SEED_B_MIX
}

/// Generated operand pair for one problem size.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPair {
    pub a: Matrix,
    pub b: Matrix,
}

/// Generate the `n x n` operand pair for `(seed, n)`.
///
/// Returns `None` when `n == 0`.
pub fn generate(seed: u32, n: u32) -> Option<GeneratedPair> {
    let a = fill(Lcg::new(seed_a(seed, n)), n)?;
    let b = fill(Lcg::new(seed_b(seed, n)), n)?;
    Some(GeneratedPair { a, b })
}

fn fill(mut rng: Lcg, n: u32) -> Option<Matrix> {
    let size = n as usize;
    let data = (0..size * size).map(|_| rng.next_micro_rounded()).collect();
    Matrix::new(size, size, data).ok()
}

/// Encoded text of a generated pair, as written to disk.
pub fn encode_pair(pair: &GeneratedPair) -> (String, String) {
    (encode_generated(&pair.a), encode_generated(&pair.b))
}

fn encode_generated(matrix: &Matrix) -> String {
    let mut text = codec::encode_with(matrix, NumberFormat::Fixed);
    text.pop();
    text
}

/// Paths of a generated pair on disk.
#[derive(Debug, Clone)]
pub struct GeneratedFiles {
    pub path_a: PathBuf,
    pub path_b: PathBuf,
}

/// Generate `(seed, n)` and write `A_<n>.txt` / `B_<n>.txt` into `out_dir`,
/// creating the directory when missing.
pub async fn generate_to_dir(
    seed: u32,
    n: u32,
    out_dir: &Path,
) -> Result<GeneratedFiles, MatrixFileError> {
    let io_err = |source| MatrixFileError::Io {
        path: out_dir.display().to_string(),
        source,
    };
    let pair = generate(seed, n).ok_or_else(|| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "matrix size must be at least 1",
        ))
    })?;
    tokio::fs::create_dir_all(out_dir).await.map_err(io_err)?;

    let files = GeneratedFiles {
        path_a: out_dir.join(format!("A_{n}.txt")),
        path_b: out_dir.join(format!("B_{n}.txt")),
    };
    let (text_a, text_b) = encode_pair(&pair);
    write_text(&files.path_a, text_a).await?;
    write_text(&files.path_b, text_b).await?;
    Ok(files)
}

async fn write_text(path: &Path, text: String) -> Result<(), MatrixFileError> {
    tokio::fs::write(path, text)
        .await
        .map_err(|source| MatrixFileError::Io {
            path: path.display().to_string(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
