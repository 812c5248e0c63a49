//! Descriptive statistics with pandas-compatible conventions
//!
//! Standard deviations take an explicit `ddof`, percentiles interpolate
//! linearly between order statistics, skewness and kurtosis are the
//! bias-corrected sample estimators. Functions return `None` instead of
//! `NaN` when a statistic is undefined.

mod features;

pub use features::{FeatureStatistics, FeatureSummary};

use std::cmp::Ordering;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Standard deviation with `ddof` delta degrees of freedom
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    let n = values.len();
    if n <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (n - ddof) as f64).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile `q` in `[0, 100]`, linear interpolation
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(percentile_sorted(&sorted(values), q))
}

fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Several percentiles over one sort
pub fn percentiles(values: &[f64], qs: &[f64]) -> Option<Vec<f64>> {
    if values.is_empty() {
        return None;
    }
    let s = sorted(values);
    Some(qs.iter().map(|&q| percentile_sorted(&s, q)).collect())
}

/// Equal-frequency bin edges for `q` bins with duplicate edges dropped
pub fn quantile_edges(values: &[f64], q: usize) -> Vec<f64> {
    if values.is_empty() || q == 0 {
        return Vec::new();
    }
    let s = sorted(values);
    let mut edges: Vec<f64> = (0..=q)
        .map(|i| percentile_sorted(&s, 100.0 * i as f64 / q as f64))
        .collect();
    edges.dedup_by(|a, b| (*a - *b).abs() <= f64::EPSILON * a.abs().max(1.0));
    edges
}

/// Bin for `value` given edges from [`quantile_edges`]: bins are
/// `(e[i], e[i+1]]` and the first bin also holds `e[0]`
pub fn bin_index(edges: &[f64], value: f64) -> Option<usize> {
    if edges.len() < 2 || value < edges[0] || value > edges[edges.len() - 1] {
        return None;
    }
    if value == edges[0] {
        return Some(0);
    }
    edges.windows(2).position(|w| value > w[0] && value <= w[1])
}

/// Adjusted Fisher-Pearson skewness
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let m = mean(values)?;
    let nf = n as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / nf;
    if m2 <= 1e-14 * m.abs().max(1.0).powi(2) {
        return None;
    }
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}

/// Bias-corrected excess kurtosis
pub fn kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 4 {
        return None;
    }
    let m = mean(values)?;
    let nf = n as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nf;
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / nf;
    if m2 <= 1e-14 * m.abs().max(1.0).powi(2) {
        return None;
    }
    let g2 = m4 / (m2 * m2) - 3.0;
    Some(((nf + 1.0) * g2 + 6.0) * (nf - 1.0) / ((nf - 2.0) * (nf - 3.0)))
}

/// Pearson correlation; `None` when lengths differ or either side is constant
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// `1 - H / ln(k)` over category counts, in `[0, 1]`.
/// A single category is maximally imbalanced; no categories score 0.
pub fn entropy_imbalance(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    let k = counts.iter().filter(|&&c| c > 0).count();
    if total == 0 || k == 0 {
        return 0.0;
    }
    if k == 1 {
        return 1.0;
    }
    let h: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    (1.0 - h / (k as f64).ln()).clamp(0.0, 1.0)
}
