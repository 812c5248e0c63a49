//! Property-based tests for the analyzers using proptest.

use ndarray::Array1;
use proptest::prelude::*;

use rai_diagnostics::balance::DataBalanceAnalyzer;
use rai_diagnostics::counterfactual::{CounterfactualAnalyzer, CounterfactualConfig};
use rai_diagnostics::data::{Dataset, Instance};
use rai_diagnostics::error_analysis::{ErrorAnalysisConfig, ErrorAnalyzer};
use rai_diagnostics::stats;

fn reference() -> Dataset {
    Dataset::new()
        .with_continuous("age", (0..30).map(|i| 18.0 + 2.0 * i as f64).collect())
        .unwrap()
        .with_continuous("income", (0..30).map(|i| 1_000.0 + (i % 6) as f64 * 250.0).collect())
        .unwrap()
        .with_categorical("job", (0..30).map(|i| ["a", "b", "c"][i % 3]).collect())
        .unwrap()
}

fn fitted_counterfactuals() -> CounterfactualAnalyzer {
    let mut analyzer = CounterfactualAnalyzer::new(CounterfactualConfig::default());
    analyzer.fit(&reference(), None).unwrap();
    analyzer
}

fn instance() -> impl Strategy<Value = Instance> {
    (18.0f64..80.0, 500.0f64..3_000.0, prop::sample::select(vec!["a", "b", "c"]))
        .prop_map(|(age, income, job)| Instance::new().with("age", age).with("income", income).with("job", job))
}

// --- Error analysis properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn error_rate_is_mean_of_indicator(
        rows in prop::collection::vec((0.0f64..10.0, any::<bool>(), any::<bool>()), 5..60),
    ) {
        let feature: Vec<f64> = rows.iter().map(|r| r.0).collect();
        let y_true: Array1<f64> = rows.iter().map(|r| r.1 as u8 as f64).collect();
        let y_pred: Array1<f64> = rows.iter().map(|r| r.2 as u8 as f64).collect();
        let x = Dataset::new().with_continuous("f", feature).unwrap();

        let config = ErrorAnalysisConfig::default().with_min_samples_leaf(2);
        let report = ErrorAnalyzer::new(config).analyze(&x, &y_true, &y_pred, None, None).unwrap();

        let mismatches = rows.iter().filter(|r| r.1 != r.2).count();
        prop_assert_eq!(report.total_errors, mismatches);
        prop_assert!((report.overall_error_rate - mismatches as f64 / rows.len() as f64).abs() < 1e-12);
        prop_assert_eq!(report.error_tree.sample_count, rows.len());
        for cohort in &report.cohorts {
            prop_assert!(cohort.error_rate > report.overall_error_rate);
            prop_assert!(cohort.size >= 2);
        }
    }
}

// --- Counterfactual distance properties ---

proptest! {
    #[test]
    fn distance_to_self_is_zero(a in instance()) {
        let analyzer = fitted_counterfactuals();
        prop_assert_eq!(analyzer.distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn distance_is_symmetric_and_non_negative(a in instance(), b in instance()) {
        let analyzer = fitted_counterfactuals();
        let ab = analyzer.distance(&a, &b).unwrap();
        let ba = analyzer.distance(&b, &a).unwrap();
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() < 1e-12);
    }
}

// --- Balance properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn disparate_impact_is_a_ratio(
        rows in prop::collection::vec((0usize..3, any::<bool>()), 2..120),
    ) {
        let group: Vec<String> = rows.iter().map(|r| format!("g{}", r.0)).collect();
        let label: Vec<&str> = rows.iter().map(|r| if r.1 { "yes" } else { "no" }).collect();
        let data = Dataset::new()
            .with_categorical("group", group)
            .unwrap()
            .with_categorical("label", label)
            .unwrap();

        let report = DataBalanceAnalyzer::default()
            .analyze(&data, Some("label"), Some(&["group".to_string()]), None)
            .unwrap();
        let balance = &report.sensitive_attribute_balance.unwrap()[0];
        let di = balance.disparate_impact_ratio.unwrap();
        prop_assert!((0.0..=1.0).contains(&di));
        prop_assert_eq!(balance.is_fair, di >= 0.8);
        let spd = balance.statistical_parity_difference.unwrap();
        prop_assert!((0.0..=1.0).contains(&spd));
    }

    #[test]
    fn label_ratio_is_majority_over_minority(majority in 1usize..200, minority in 1usize..200) {
        let (big, small) = (majority.max(minority), majority.min(minority));
        let label: Vec<&str> = std::iter::repeat("p").take(big).chain(std::iter::repeat("q").take(small)).collect();
        let data = Dataset::new().with_categorical("label", label).unwrap();

        let report = DataBalanceAnalyzer::default().analyze(&data, Some("label"), None, None).unwrap();
        let balance = report.label_balance.unwrap();
        prop_assert!((balance.imbalance_ratio - big as f64 / small as f64).abs() < 1e-12);
        prop_assert!(balance.imbalance_ratio >= 1.0);
        prop_assert_eq!(balance.is_balanced, balance.imbalance_ratio <= 3.0);
    }
}

// --- Descriptive statistics ---

proptest! {
    #[test]
    fn median_lies_within_range(values in prop::collection::vec(-1e6f64..1e6, 1..100)) {
        let median = stats::median(&values).unwrap();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(min <= median && median <= max);
    }
}
