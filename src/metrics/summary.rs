//! Serializable ranking report

use serde::{Deserialize, Serialize};

use super::ranking::{PrecisionAtK, RankingMetrics};
use crate::error::{PanelError, Result};

/// Headline numbers for one scored list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSummary {
    pub count: usize,
    pub labeled: usize,
    pub baseline: Option<f64>,
    /// Missing when only one class is labeled
    pub auc: Option<f64>,
    pub precision: Vec<PrecisionAtK>,
}

impl RankingSummary {
    /// Summarize `metrics` at each cut-off in `ks`.
    ///
    /// Cut-offs past the labeled count are skipped unless `extrapolate`.
    pub fn compute(metrics: &RankingMetrics, ks: &[usize], extrapolate: bool) -> Result<Self> {
        let auc = match metrics.auc() {
            Ok(auc) => Some(auc),
            Err(PanelError::Range(_)) => None,
            Err(e) => return Err(e),
        };

        let labeled = metrics.count_labeled();
        let precision = ks
            .iter()
            .filter(|&&k| extrapolate || k <= labeled)
            .map(|&k| metrics.precision_at_k(k, extrapolate))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            count: metrics.count(),
            labeled,
            baseline: metrics.baseline(),
            auc,
            precision,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
