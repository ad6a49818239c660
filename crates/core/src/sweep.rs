//! Benchmark sweep expressions and the combination cap.
//!
//! Sizes and process counts are entered as either a comma list
//! (`"128, 256, 512"`) or an inclusive range with optional step
//! (`"128-1024:128"`). Both resolve to a sorted, de-duplicated list.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Default maximum of `|sizes| x |procs|` per batch.
pub const DEFAULT_COMBINATION_CAP: usize = 100;

/// Default repetitions per measured configuration.
pub const DEFAULT_REPEATS: u32 = 3;

/// Upper bound on repetitions per configuration.
pub const MAX_REPEATS: u32 = 50;

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)(?::(\d+))?$").expect("valid regex"));

/// Parse a list or range expression into sorted unique integers in
/// `min..=max`.
pub fn parse_list_or_range(expr: &str, min: u32, max: u32) -> Result<Vec<u32>, CoreError> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(CoreError::Validation(
            "Provide a list (e.g. \"128,256\") or a range (e.g. \"128-1024:128\")".to_string(),
        ));
    }

    let values: BTreeSet<u32> = if compact.contains('-') {
        parse_range(&compact, expr)?
    } else {
        compact
            .split(',')
            .map(parse_value)
            .collect::<Result<_, _>>()?
    };

    if let Some(v) = values.iter().find(|v| **v < min || **v > max) {
        return Err(CoreError::Validation(format!(
            "Value out of range: {v} (min={min}, max={max})"
        )));
    }
    if values.is_empty() {
        return Err(CoreError::Validation(
            "Empty range: check start, end and step".to_string(),
        ));
    }
    Ok(values.into_iter().collect())
}

fn parse_value(part: &str) -> Result<u32, CoreError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::Validation(format!(
            "Non-numeric value in list: \"{part}\""
        )));
    }
    part.parse()
        .map_err(|_| CoreError::Validation(format!("Value too large: \"{part}\"")))
}

fn parse_range(compact: &str, original: &str) -> Result<BTreeSet<u32>, CoreError> {
    let caps = RANGE_RE.captures(compact).ok_or_else(|| {
        CoreError::Validation(format!(
            "Unrecognized format: \"{}\". Use a,b,c or start-end:step",
            original.trim()
        ))
    })?;
    let start = parse_value(&caps[1])?;
    let end = parse_value(&caps[2])?;
    let step = match caps.get(3) {
        Some(m) => parse_value(m.as_str())?,
        None => 1,
    };
    if step == 0 {
        return Err(CoreError::Validation("Step must not be 0".to_string()));
    }

    // Descending ranges walk down from `start`.
    let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
    let mut out = BTreeSet::new();
    if start <= end {
        let mut v = lo;
        while v <= hi {
            out.insert(v);
            v = match v.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    } else {
        let mut v = hi;
        while v >= lo {
            out.insert(v);
            v = match v.checked_sub(step) {
                Some(next) => next,
                None => break,
            };
        }
    }
    Ok(out)
}

/// Check `|sizes| x |procs|` against `limit` and return the combination count.
pub fn validate_combination_limit(
    sizes: &[u32],
    procs: &[u32],
    limit: usize,
) -> Result<usize, CoreError> {
    let combinations = sizes.len() * procs.len();
    if combinations > limit {
        return Err(CoreError::Validation(format!(
            "Too many combinations: {combinations} (limit {limit})"
        )));
    }
    Ok(combinations)
}

/// Validate a repetition count.
pub fn validate_repeats(repeats: u32) -> Result<(), CoreError> {
    if repeats == 0 || repeats > MAX_REPEATS {
        return Err(CoreError::Validation(format!(
            "Repeats must be between 1 and {MAX_REPEATS}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
