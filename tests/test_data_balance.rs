//! Integration test: balance, fairness and quality on a hiring dataset

use approx::assert_abs_diff_eq;
use polars::prelude::*;
use rai_diagnostics::balance::{
    DataBalanceAnalyzer, DataBalanceConfig, FairnessStatus, FeatureDistribution, LabelStatus, QualityWarning,
};
use rai_diagnostics::data::Dataset;
use rai_diagnostics::DiagnosticsError;

/// 200 applicants. Men are approved 80% of the time, women 40%.
fn hiring() -> Dataset {
    let gender: Vec<&str> = (0..200).map(|i| if i < 100 { "M" } else { "F" }).collect();
    let region: Vec<&str> = (0..200).map(|i| if i % 2 == 0 { "urban" } else { "rural" }).collect();
    let decision: Vec<&str> = (0..200)
        .map(|i| {
            let approved = if i < 100 { i % 5 != 0 } else { i % 5 < 2 };
            if approved { "approved" } else { "denied" }
        })
        .collect();
    let experience: Vec<f64> = (0..200).map(|i| ((i * 17) % 25) as f64).collect();
    let df = df!(
        "gender" => gender.as_slice(),
        "region" => region.as_slice(),
        "experience" => experience.as_slice(),
        "decision" => decision.as_slice()
    )
    .unwrap();
    Dataset::from_dataframe(&df).unwrap()
}

fn sensitive() -> Vec<String> {
    vec!["gender".to_string(), "region".to_string()]
}

#[test]
fn test_disparate_impact_flags_gender() {
    let report = DataBalanceAnalyzer::default()
        .analyze(&hiring(), Some("decision"), Some(&sensitive()), None)
        .unwrap();

    let balances = report.sensitive_attribute_balance.as_ref().unwrap();
    let gender = balances.iter().find(|b| b.attribute_name == "gender").unwrap();
    assert_abs_diff_eq!(gender.disparate_impact_ratio.unwrap(), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(gender.statistical_parity_difference.unwrap(), 0.4, epsilon = 1e-12);
    assert!(!gender.is_fair);
    assert!(!gender.recommendations.is_empty());

    let region = balances.iter().find(|b| b.attribute_name == "region").unwrap();
    assert!(region.is_fair);

    for balance in balances {
        let di = balance.disparate_impact_ratio.unwrap();
        assert!((0.0..=1.0).contains(&di));
        assert_eq!(balance.is_fair, di >= 0.8);
    }
    assert_eq!(report.summary.fairness_status, FairnessStatus::Unfair);
}

#[test]
fn test_label_balance() {
    let report = DataBalanceAnalyzer::default()
        .analyze(&hiring(), Some("decision"), None, None)
        .unwrap();
    let label = report.label_balance.as_ref().unwrap();
    // 120 approved, 80 denied
    assert_eq!(label.majority_class, "approved");
    assert_abs_diff_eq!(label.imbalance_ratio, 1.5);
    assert!(label.is_balanced);
    assert_eq!(report.summary.label_status, LabelStatus::Balanced);
    assert_eq!(report.summary.fairness_status, FairnessStatus::Unknown);
}

#[test]
fn test_intersectional_groups() {
    let report = DataBalanceAnalyzer::default()
        .analyze(&hiring(), Some("decision"), Some(&sensitive()), None)
        .unwrap();
    let intersectional = report.intersectional_analysis.as_ref().unwrap();
    assert_eq!(intersectional.attributes, ("gender".to_string(), "region".to_string()));
    assert_eq!(intersectional.groups.len(), 4);
    assert_eq!(intersectional.groups.iter().map(|g| g.count).sum::<usize>(), 200);
    assert!(!intersectional.is_intersectionally_fair);
}

#[test]
fn test_feature_kinds_detected() {
    let report = DataBalanceAnalyzer::default()
        .analyze(&hiring(), Some("decision"), None, None)
        .unwrap();
    assert!(report.feature("gender").unwrap().is_categorical());
    assert!(!report.feature("experience").unwrap().is_categorical());
    match &report.feature("experience").unwrap().distribution {
        FeatureDistribution::Continuous(Some(summary)) => {
            assert_eq!(summary.min, 0.0);
            assert_eq!(summary.max, 24.0);
        }
        other => panic!("unexpected distribution {:?}", other),
    }
    assert_eq!(report.dataset_info.num_samples, 200);
    assert_eq!(report.summary.total_features_analyzed, 4);
}

#[test]
fn test_extreme_label_imbalance() {
    let label: Vec<&str> = (0..1000).map(|i| if i < 950 { "0" } else { "1" }).collect();
    let data = Dataset::new().with_categorical("target", label).unwrap();
    let config = DataBalanceConfig::default().with_label_column("target");
    let report = DataBalanceAnalyzer::new(config).analyze(&data, None, None, None).unwrap();

    let label = report.label_balance.unwrap();
    assert_abs_diff_eq!(label.imbalance_ratio, 19.0);
    assert!(!label.is_balanced);
    assert!(label.recommendations.iter().any(|r| r.contains("SMOTE")));
    assert_eq!(report.summary.label_status, LabelStatus::Imbalanced);
}

#[test]
fn test_quality_warnings_reach_summary() {
    let data = Dataset::new()
        .with_continuous("sparse", vec![f64::NAN, f64::NAN, f64::NAN, f64::NAN, 1.0])
        .unwrap()
        .with_categorical("constant", vec!["a"; 5])
        .unwrap();
    let report = DataBalanceAnalyzer::default().analyze(&data, None, None, None).unwrap();
    assert!(report
        .data_quality
        .warnings
        .iter()
        .any(|w| matches!(w, QualityWarning::HighMissingness { column, .. } if column == "sparse")));
    assert!(report.summary.data_quality_score < 0.8);
    assert!(report.summary.priority_actions.iter().any(|a| a.contains("Clean")));
}

#[test]
fn test_unknown_sensitive_feature() {
    let err = DataBalanceAnalyzer::default()
        .analyze(&hiring(), Some("decision"), Some(&["age".to_string()]), None)
        .unwrap_err();
    assert!(matches!(err, DiagnosticsError::FeatureNotFound(name) if name == "age"));
}
