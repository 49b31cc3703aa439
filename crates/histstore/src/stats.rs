//! Summary statistics over histogram bins

use crate::histogram::Histogram;

/// Entries, mean and standard deviation of a histogram.
///
/// `entries` is the truncated sum of bin contents. Mean and std are taken
/// over bin centers and are only defined when `entries > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistStats {
    /// Truncated total of the regular bins
    pub entries: i64,
    /// Content-weighted mean of bin centers
    pub mean: Option<f64>,
    /// Content-weighted standard deviation of bin centers
    pub std: Option<f64>,
}

impl HistStats {
    /// Compute statistics from raw counts and edges
    pub fn compute(counts: &[f64], edges: &[f64]) -> Self {
        let total: f64 = counts.iter().sum();
        // saturating cast, NaN becomes 0
        let entries = total.trunc() as i64;

        if entries <= 0 || edges.len() != counts.len() + 1 {
            return Self {
                entries,
                mean: None,
                std: None,
            };
        }

        let n = entries as f64;
        let centers: Vec<f64> = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let mean = centers
            .iter()
            .zip(counts)
            .map(|(x, c)| x * c)
            .sum::<f64>()
            / n;
        let var = centers
            .iter()
            .zip(counts)
            .map(|(x, c)| c * (x - mean).powi(2))
            .sum::<f64>()
            / n;

        Self {
            entries,
            mean: Some(mean),
            std: Some(var.sqrt()),
        }
    }

    /// Compute statistics for a decoded histogram (flow bins excluded)
    pub fn from_histogram(hist: &Histogram) -> Self {
        Self::compute(&hist.counts, &hist.edges)
    }
}
