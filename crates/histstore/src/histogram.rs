//! One-dimensional binned histogram

use crate::error::{Error, Result};

/// A decoded 1-D histogram.
///
/// `edges` always holds one more element than `counts`. Flow bins are kept
/// apart from `counts` and never enter the summary statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Free-form title stored alongside the bins
    pub title: String,
    /// Bin edges, non-decreasing, `counts.len() + 1` long
    pub edges: Vec<f64>,
    /// Per-bin contents
    pub counts: Vec<f64>,
    /// Content below the first edge
    pub underflow: f64,
    /// Content above the last edge
    pub overflow: f64,
}

impl Histogram {
    /// Build a histogram from explicit edges and counts.
    pub fn new(title: impl Into<String>, edges: Vec<f64>, counts: Vec<f64>) -> Result<Self> {
        let hist = Self {
            title: title.into(),
            edges,
            counts,
            underflow: 0.0,
            overflow: 0.0,
        };
        hist.validate()?;
        Ok(hist)
    }

    /// Build a histogram with `counts.len()` equal-width bins over `[low, high)`.
    pub fn uniform(
        title: impl Into<String>,
        low: f64,
        high: f64,
        counts: Vec<f64>,
    ) -> Result<Self> {
        if counts.is_empty() {
            return Err(Error::Parse("histogram needs at least one bin".to_string()));
        }
        let n = counts.len();
        let width = (high - low) / n as f64;
        let edges = (0..=n).map(|i| low + width * i as f64).collect();
        Self::new(title, edges, counts)
    }

    /// Set the flow bins.
    pub fn with_flow(mut self, underflow: f64, overflow: f64) -> Self {
        self.underflow = underflow;
        self.overflow = overflow;
        self
    }

    /// Number of regular bins
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Check the edges/counts shape invariant.
    pub fn validate(&self) -> Result<()> {
        if self.edges.len() != self.counts.len() + 1 {
            return Err(Error::Parse(format!(
                "histogram has {} counts but {} edges",
                self.counts.len(),
                self.edges.len()
            )));
        }
        // NaN edges fail this check too
        if self.edges.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(Error::Parse("histogram edges are not non-decreasing".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_edges() {
        let hist = Histogram::uniform("h", 0.0, 4.0, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(hist.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(hist.bins(), 4);
    }

    #[test]
    fn test_shape_mismatch() {
        let result = Histogram::new("h", vec![0.0, 1.0], vec![1.0, 2.0]);
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_decreasing_edges() {
        let result = Histogram::new("h", vec![0.0, 2.0, 1.0], vec![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_nan_edge_rejected() {
        let result = Histogram::new("h", vec![0.0, f64::NAN], vec![1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_uniform_rejected() {
        assert!(Histogram::uniform("h", 0.0, 1.0, vec![]).is_err());
    }
}
