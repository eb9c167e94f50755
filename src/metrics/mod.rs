//! Ranking evaluation over partially labeled outcomes
//!
//! - Precision at k, with bounds over unlabeled examples
//! - Running precision and recall series
//! - ROC AUC

mod ranking;
mod summary;

pub use ranking::{rank_descending, PrecisionAtK, RankingMetrics, TopK};
pub use summary::RankingSummary;
