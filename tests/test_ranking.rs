//! Integration tests for ranking metrics on partially labeled lists

use ndarray::{array, Array1};
use spacetime_panel::metrics::{rank_descending, RankingMetrics, RankingSummary};
use spacetime_panel::PanelError;

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
}

#[test]
fn test_precision_at_k_labeled_and_extrapolated_agree_when_top_is_labeled() {
    let m = RankingMetrics::new(array![1.0, 0.0, 1.0, f64::NAN], array![0.9, 0.1, 0.5, 0.4]).unwrap();

    let labeled = m.precision_at_k(2, false).unwrap();
    let extrapolated = m.precision_at_k(2, true).unwrap();

    assert_eq!(labeled.precision, Some(1.0));
    assert_eq!(extrapolated.precision, Some(1.0));
    assert_eq!(extrapolated.bounds, Some((1.0, 1.0)));
}

#[test]
fn test_bounds_bracket_precision() {
    let y_true = array![f64::NAN, 1.0, f64::NAN, 0.0, 1.0, f64::NAN, 0.0, 1.0];
    let y_score: Array1<f64> = Array1::linspace(1.0, 0.0, 8);
    let m = RankingMetrics::new(y_true, y_score).unwrap();

    for k in 1..=8 {
        let p = m.precision_at_k(k, true).unwrap();
        let (lower, upper) = p.bounds.unwrap();
        assert!(lower <= upper);
        if let Some(precision) = p.precision {
            assert!(lower <= precision + 1e-12 && precision <= upper + 1e-12);
        }
    }

    // top 3: nan, 1, nan
    let p = m.precision_at_k(3, true).unwrap();
    assert_eq!(p.positives, 1);
    assert_eq!(p.labeled, 1);
    let (lower, upper) = p.bounds.unwrap();
    assert_close(lower, 1.0 / 3.0);
    assert_close(upper, 1.0);
}

#[test]
fn test_ties_keep_row_order() {
    let m = RankingMetrics::from_slices(&[0.0, 1.0, 1.0], &[0.5, 0.5, 0.5]).unwrap();
    assert_eq!(m.ranking(), &[0, 1, 2]);
    // the earlier, negative row wins the tie
    assert_eq!(m.precision_at_k(1, false).unwrap().precision, Some(0.0));
    assert_eq!(rank_descending(&array![0.1, 0.7, 0.7]), vec![1, 2, 0]);
}

#[test]
fn test_too_large_k_without_extrapolation() {
    let m = RankingMetrics::from_slices(&[1.0, f64::NAN], &[0.3, 0.2]).unwrap();
    assert!(matches!(m.top_k(2, false), Err(PanelError::Range(_))));
    assert!(m.top_k(2, true).is_ok());
}

#[test]
fn test_series_are_cumulative() {
    let m = RankingMetrics::from_slices(
        &[1.0, 0.0, f64::NAN, 1.0, 0.0],
        &[0.9, 0.8, 0.7, 0.6, 0.5],
    )
    .unwrap();

    let precision = m.precision_series(None);
    assert_eq!(precision.len(), 5);
    assert_eq!(precision[0], Some(1.0));
    assert_eq!(precision[1], Some(0.5));
    assert_eq!(precision[2], Some(0.5));
    assert_close(precision[3].unwrap(), 2.0 / 3.0);

    let recall = m.recall_series(None, true);
    assert_eq!(recall, vec![1, 1, 1, 2, 2]);
    assert!(recall.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(m.recall_series(Some(3), false), vec![0, 1, 1]);
}

#[test]
fn test_auc() {
    let m = RankingMetrics::from_slices(&[0.0, 1.0], &[0.2, 0.8]).unwrap();
    assert_close(m.auc().unwrap(), 1.0);

    let m = RankingMetrics::from_slices(&[1.0, 0.0], &[0.2, 0.8]).unwrap();
    assert_close(m.auc().unwrap(), 0.0);

    // unlabeled rows are ignored
    let m = RankingMetrics::from_slices(&[0.0, f64::NAN, 1.0], &[0.1, 0.9, 0.4]).unwrap();
    assert_close(m.auc().unwrap(), 1.0);
}

#[test]
fn test_summary_json() {
    let m = RankingMetrics::from_slices(&[1.0, 0.0, 1.0, f64::NAN], &[0.9, 0.1, 0.5, 0.4]).unwrap();
    let summary = RankingSummary::compute(&m, &[1, 3], true).unwrap();

    let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
    assert_eq!(json["count"], 4);
    assert_eq!(json["labeled"], 3);
    assert_eq!(json["precision"].as_array().unwrap().len(), 2);
}
