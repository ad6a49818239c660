//! Timing statistics for benchmark sweeps.
//!
//! The first sample of every repeated run is treated as a cold-start warm-up
//! and excluded from the reported median.

use serde::Serialize;

/// Median of `samples` after discarding the first (warm-up) sample.
///
/// With a single sample there is nothing to discard, so it is returned
/// unchanged. Returns `None` for an empty slice.
pub fn median_after_warmup(samples: &[f64]) -> Option<f64> {
    match samples {
        [] => None,
        [only] => Some(*only),
        [_warmup, rest @ ..] => median(rest),
    }
}

/// Plain median; the mean of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Samples that remain after the warm-up is dropped.
pub fn post_warmup(samples: &[f64]) -> &[f64] {
    samples.get(1..).unwrap_or(&[])
}

/// `Ts / Tp`.
pub fn speedup(serial_ms: f64, parallel_ms: f64) -> f64 {
    serial_ms / parallel_ms
}

/// `S / p`; `1.0` is ideal.
pub fn efficiency(speedup: f64, procs: u32) -> f64 {
    speedup / procs as f64
}

/// Karp–Flatt experimentally determined serial fraction:
/// `(1/S - 1) / (1 - 1/p)`.
///
/// Undefined at `p <= 1` and for a zero speedup. Negative results are
/// valid estimates and are returned as-is.
pub fn karp_flatt(speedup: f64, procs: u32) -> Option<f64> {
    if procs <= 1 || speedup == 0.0 || !speedup.is_finite() {
        return None;
    }
    let p = procs as f64;
    Some((1.0 / speedup - 1.0) / (1.0 - 1.0 / p))
}

/// Derived scaling figures for one parallel measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScalingMetrics {
    pub speedup: Option<f64>,
    pub efficiency: Option<f64>,
    pub karp_flatt: Option<f64>,
}

impl ScalingMetrics {
    /// Derive from the serial reference `ts` (if one exists) and the parallel
    /// time `tp` at `procs` processes. All fields stay `None` when the
    /// reference is missing or either time is not positive.
    pub fn derive(ts: Option<f64>, tp: f64, procs: u32) -> Self {
        let Some(ts) = ts.filter(|t| *t > 0.0) else {
            return Self::default();
        };
        if tp <= 0.0 || procs == 0 {
            return Self::default();
        }
        let s = speedup(ts, tp);
        Self {
            speedup: Some(s),
            efficiency: Some(efficiency(s, procs)),
            karp_flatt: karp_flatt(s, procs),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
