//! Column statistics backing the imputation policy.
//!
//! Numeric columns are filled with the median when their distribution is
//! strongly right-skewed (adjusted Fisher-Pearson skewness > 1), otherwise
//! with the mean. Text columns are filled with the most frequent value,
//! breaking ties toward the lexicographically smallest candidate.

use std::collections::HashMap;

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median. `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent value; ties break toward the smallest value so the result
/// is deterministic regardless of row order.
pub fn mode<'a, I: IntoIterator<Item = &'a str>>(values: I) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.cmp(va)))
        .map(|(v, _)| v.to_string())
}

/// Adjusted Fisher-Pearson skewness coefficient.
///
/// `None` when fewer than three values are present or the variance is zero,
/// matching the "not skewed" reading of an undefined estimate.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;

    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
    if m2 == 0.0 {
        return None;
    }

    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}
