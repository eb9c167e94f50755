//! Ranking metrics over partially labeled data
//!
//! Labels are `0.0`, `1.0` or `NaN` (unlabeled). Examples are ranked by
//! descending score with a stable sort: among equal scores the earlier
//! example ranks higher, and `NaN` scores rank last.

use std::cmp::Ordering;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

/// Labeled outcome of a top-k cut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopK {
    /// Positive labels inside the cut
    pub positives: usize,
    /// Labeled examples inside the cut
    pub labeled: usize,
}

/// Precision at a cut-off, with bounds when extrapolating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionAtK {
    pub k: usize,
    /// Missing when no labeled example falls inside the cut
    pub precision: Option<f64>,
    pub positives: usize,
    pub labeled: usize,
    /// `(lower, upper)` assuming unlabeled top-k examples are all negative
    /// or all positive, normalized by `k`
    pub bounds: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct RankingMetrics {
    y_true: Array1<f64>,
    y_score: Array1<f64>,
    /// Example indices, best score first
    order: Vec<usize>,
}

impl RankingMetrics {
    pub fn new(y_true: Array1<f64>, y_score: Array1<f64>) -> Result<Self> {
        if y_true.len() != y_score.len() {
            return Err(PanelError::InvalidInput(format!(
                "Labels and scores must have same lengths: {} != {}",
                y_true.len(),
                y_score.len()
            )));
        }
        if let Some(bad) = y_true.iter().find(|&&y| !(y.is_nan() || y == 0.0 || y == 1.0)) {
            return Err(PanelError::InvalidInput(format!(
                "Labels must be 0, 1 or missing, found {}",
                bad
            )));
        }

        let order = rank_descending(&y_score);
        Ok(Self {
            y_true,
            y_score,
            order,
        })
    }

    pub fn from_slices(y_true: &[f64], y_score: &[f64]) -> Result<Self> {
        Self::new(Array1::from_vec(y_true.to_vec()), Array1::from_vec(y_score.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    pub fn labels(&self) -> &Array1<f64> {
        &self.y_true
    }

    pub fn scores(&self) -> &Array1<f64> {
        &self.y_score
    }

    /// Example indices in rank order
    pub fn ranking(&self) -> &[usize] {
        &self.order
    }

    /// Number of examples
    pub fn count(&self) -> usize {
        self.len()
    }

    pub fn count_labeled(&self) -> usize {
        self.y_true.iter().filter(|y| !y.is_nan()).count()
    }

    /// Positive rate among labeled examples
    pub fn baseline(&self) -> Option<f64> {
        let labeled = self.count_labeled();
        if labeled == 0 {
            return None;
        }
        let positives = self.y_true.iter().filter(|&&y| y == 1.0).count();
        Some(positives as f64 / labeled as f64)
    }

    /// Positives and labeled count among the `k` best examples.
    ///
    /// Without `extrapolate`, unlabeled examples are dropped before the cut
    /// and `k` larger than the labeled count is a [`PanelError::Range`].
    /// With `extrapolate`, the cut is taken over all examples and `k` past
    /// the end takes everything.
    pub fn top_k(&self, k: usize, extrapolate: bool) -> Result<TopK> {
        if k == 0 {
            return Ok(TopK {
                positives: 0,
                labeled: 0,
            });
        }

        if extrapolate {
            let top = &self.order[..k.min(self.order.len())];
            let labeled = top.iter().filter(|&&i| !self.y_true[i].is_nan()).count();
            return Ok(TopK {
                positives: self.positives_in(top),
                labeled,
            });
        }

        let labeled: Vec<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&i| !self.y_true[i].is_nan())
            .collect();
        if k > labeled.len() {
            return Err(PanelError::Range(format!(
                "Cannot calculate precision at {} > {}",
                k,
                labeled.len()
            )));
        }

        Ok(TopK {
            positives: self.positives_in(&labeled[..k]),
            labeled: k,
        })
    }

    pub fn precision_at_k(&self, k: usize, extrapolate: bool) -> Result<PrecisionAtK> {
        let TopK { positives, labeled } = self.top_k(k, extrapolate)?;
        let precision = (labeled > 0).then(|| positives as f64 / labeled as f64);

        // Undefined for an empty cut or one reaching past the last example
        let bounds = (extrapolate && k > 0 && k <= self.len()).then(|| {
            let unlabeled = k - labeled;
            (
                positives as f64 / k as f64,
                (positives + unlabeled) as f64 / k as f64,
            )
        });

        Ok(PrecisionAtK {
            k,
            precision,
            positives,
            labeled,
            bounds,
        })
    }

    /// Precision over the whole list: labeled examples only when `dropna`,
    /// otherwise extrapolated over every example
    pub fn precision(&self, dropna: bool) -> Result<Option<f64>> {
        let result = if dropna {
            self.precision_at_k(self.count_labeled(), false)?
        } else {
            self.precision_at_k(self.len(), true)?
        };
        Ok(result.precision)
    }

    /// Running precision for cut-offs `1..=k` (all examples by default).
    /// Unlabeled examples count toward neither numerator nor denominator.
    pub fn precision_series(&self, k: Option<usize>) -> Vec<Option<f64>> {
        let k = k.unwrap_or(self.len()).min(self.len());
        let mut positives = 0usize;
        let mut labeled = 0usize;

        self.order[..k]
            .iter()
            .map(|&i| {
                let y = self.y_true[i];
                if !y.is_nan() {
                    labeled += 1;
                    if y == 1.0 {
                        positives += 1;
                    }
                }
                (labeled > 0).then(|| positives as f64 / labeled as f64)
            })
            .collect()
    }

    /// Running count of examples labeled `value` for cut-offs `1..=k`
    pub fn recall_series(&self, k: Option<usize>, value: bool) -> Vec<usize> {
        let k = k.unwrap_or(self.len()).min(self.len());
        let target = if value { 1.0 } else { 0.0 };

        self.order[..k]
            .iter()
            .scan(0usize, |found, &i| {
                if self.y_true[i] == target {
                    *found += 1;
                }
                Some(*found)
            })
            .collect()
    }

    /// Area under the ROC curve over labeled examples, tied scores
    /// counting one half.
    ///
    /// Fails with [`PanelError::Range`] unless both classes are present.
    pub fn auc(&self) -> Result<f64> {
        let mut labeled: Vec<(f64, bool)> = self
            .y_true
            .iter()
            .zip(self.y_score.iter())
            .filter(|(y, _)| !y.is_nan())
            .map(|(&y, &s)| (s, y == 1.0))
            .collect();

        let n_pos = labeled.iter().filter(|(_, pos)| *pos).count();
        let n_neg = labeled.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(PanelError::Range(format!(
                "AUC needs both classes, found {} positive and {} negative labels",
                n_pos, n_neg
            )));
        }

        labeled.sort_by(|a, b| ascending(a.0, b.0));

        // Mann-Whitney U with average ranks over ties
        let mut rank_sum = 0.0;
        let mut start = 0;
        while start < labeled.len() {
            let mut end = start + 1;
            while end < labeled.len() && ascending(labeled[start].0, labeled[end].0).is_eq() {
                end += 1;
            }
            let avg_rank = (start + end + 1) as f64 / 2.0;
            let positives = labeled[start..end].iter().filter(|(_, pos)| *pos).count();
            rank_sum += avg_rank * positives as f64;
            start = end;
        }

        let n_pos = n_pos as f64;
        let n_neg = n_neg as f64;
        Ok((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
    }

    fn positives_in(&self, indices: &[usize]) -> usize {
        indices.iter().filter(|&&i| self.y_true[i] == 1.0).count()
    }
}

/// Stable descending order of `scores`, `NaN` last
pub fn rank_descending(scores: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| ascending(scores[b], scores[a]));
    order
}

/// Ascending score order with `NaN` below every number
fn ascending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
