//! Integration test: treatment effect recovery

use approx::assert_relative_eq;
use ndarray::Array1;
use rai_diagnostics::causal::{CausalAnalyzer, CausalConfig, CausalMethod, Policy, Priority, Variable, WhatIfScenario};
use rai_diagnostics::data::Dataset;
use rai_diagnostics::DiagnosticsError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// y = 2 t + 3 w + noise, with t partly driven by w
fn confounded(n: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let noise = Normal::new(0.0, 0.5).unwrap();
    let w: Vec<f64> = (0..n).map(|i| (i % 10) as f64).collect();
    let t: Vec<f64> = w.iter().map(|w| 0.5 * w + noise.sample(&mut rng) * 2.0).collect();
    let y: Vec<f64> = t
        .iter()
        .zip(&w)
        .map(|(t, w)| 2.0 * t + 3.0 * w + noise.sample(&mut rng))
        .collect();
    Dataset::new()
        .with_continuous("discount", t)
        .unwrap()
        .with_continuous("loyalty", w)
        .unwrap()
        .with_continuous("spend", y)
        .unwrap()
}

/// Binary treatment shifting the outcome by 2
fn randomized(n: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let noise = Normal::new(0.0, 0.3).unwrap();
    let t: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
    let y: Vec<f64> = t.iter().map(|t| 1.0 + 2.0 * t + noise.sample(&mut rng)).collect();
    Dataset::new()
        .with_continuous("treated", t)
        .unwrap()
        .with_continuous("outcome", y)
        .unwrap()
}

fn fit(config: CausalConfig, x: &Dataset, treatment: &str, outcome: &str) -> CausalAnalyzer {
    let mut analyzer = CausalAnalyzer::new(config);
    analyzer
        .fit(x, Variable::Column(treatment.into()), Variable::Column(outcome.into()), None)
        .unwrap();
    analyzer
}

#[test]
fn test_linear_recovers_slope_under_confounding() {
    let x = confounded(400);
    let analyzer = fit(CausalConfig::default(), &x, "discount", "spend");
    let effect = analyzer.estimate_ate().unwrap();

    assert_eq!(effect.method_used, CausalMethod::Linear);
    assert!((effect.ate - 2.0).abs() < 0.3, "ate = {}", effect.ate);
    assert!(effect.is_significant);
    assert!(effect.confidence_interval.0 <= effect.ate && effect.ate <= effect.confidence_interval.1);

    let summary = analyzer.get_causal_summary().unwrap();
    assert_eq!(summary.confounders, vec!["loyalty".to_string()]);
    assert!(summary.interpretation.contains("raises"));
}

#[test]
fn test_unadjusted_slope_is_biased() {
    let x = confounded(400);
    let analyzer = fit(CausalConfig::default().with_method(CausalMethod::Simple), &x, "discount", "spend");
    let ate = analyzer.estimate_ate().unwrap().ate;
    assert!(ate > 2.5, "confounding should inflate the raw slope, got {}", ate);
}

#[test]
fn test_binary_treatment_with_learners() {
    let x = randomized(200);
    for method in [CausalMethod::Linear, CausalMethod::Forest, CausalMethod::MetaLearner] {
        let analyzer = fit(CausalConfig::default().with_method(method), &x, "treated", "outcome");
        let effect = analyzer.estimate_ate().unwrap();
        assert_eq!(effect.method_used, method);
        assert!((effect.ate - 2.0).abs() < 0.3, "{} ate = {}", method, effect.ate);
        assert!(effect.is_significant, "{} not significant", method);
    }
}

#[test]
fn test_cate_from_learner_scores_new_rows() {
    let x = randomized(200);
    let analyzer = fit(CausalConfig::default().with_method(CausalMethod::Forest), &x, "treated", "outcome");
    let effect = analyzer.estimate_ate().unwrap();
    assert_eq!(effect.cate.as_ref().map(Array1::len), Some(200));

    let cate = analyzer.estimate_cate(&x.select_rows(&[0, 1, 2])).unwrap();
    assert_eq!(cate.len(), 3);
    let stats = analyzer.get_causal_summary().unwrap().cate_statistics.unwrap();
    assert!(stats.positive_pct > 90.0);
}

#[test]
fn test_values_treatment_uses_configured_names() {
    let x = confounded(200);
    let t = x.numeric_column("discount").unwrap();
    let y = x.numeric_column("spend").unwrap();
    let w = x.select_columns(&["loyalty"]).unwrap();

    let mut analyzer = CausalAnalyzer::new(CausalConfig::default().with_treatment_features(vec!["discount"]));
    analyzer
        .fit(&Dataset::new(), Variable::Values(t), Variable::Values(y), Some(&w))
        .unwrap();
    let effect = analyzer.estimate_ate().unwrap();
    assert_eq!(effect.treatment, "discount");
    assert_eq!(effect.outcome, "outcome");
    assert!((effect.ate - 2.0).abs() < 0.4);
}

#[test]
fn test_what_if_and_policy() {
    let x = confounded(400);
    let analyzer = fit(CausalConfig::default(), &x, "discount", "spend");
    let ate = analyzer.estimate_ate().unwrap().ate;
    let mean_t = x.numeric_column("discount").unwrap().mean().unwrap();

    let results = analyzer
        .what_if_analysis(&x, &[WhatIfScenario::new("bigger discount").set("discount", mean_t + 1.0).set("loyalty", 9.0)])
        .unwrap();
    let result = &results[0];
    assert_eq!(result.treatment_changes.len(), 1);
    assert_relative_eq!(result.predicted_outcome_change, ate, epsilon = 1e-9);
    assert!(result.affected_population_pct.is_some());

    let policies = analyzer
        .analyze_policy(&x, &[Policy::new("discount +1").target("all").change("discount", 1.0).with_cost(4.0)])
        .unwrap();
    let policy = &policies[0];
    assert_relative_eq!(policy.expected_outcome_improvement, ate, epsilon = 1e-9);
    assert_relative_eq!(policy.expected_total_improvement, ate * 400.0, epsilon = 1e-6);
    assert_relative_eq!(policy.cost_benefit_ratio.unwrap(), ate / 4.0, epsilon = 1e-9);
    assert_eq!(policy.implementation_priority, Priority::High);
}

#[test]
fn test_collinear_confounder_falls_back() {
    let t: Vec<f64> = (0..50).map(|i| i as f64).collect();
    let copy = t.clone();
    let y: Vec<f64> = t.iter().map(|t| 1.5 * t).collect();
    let x = Dataset::new()
        .with_continuous("t", t)
        .unwrap()
        .with_continuous("t_copy", copy)
        .unwrap()
        .with_continuous("y", y)
        .unwrap();
    let analyzer = fit(CausalConfig::default(), &x, "t", "y");
    let effect = analyzer.estimate_ate().unwrap();
    assert_eq!(effect.method_requested, CausalMethod::Linear);
    assert_eq!(effect.method_used, CausalMethod::Simple);
    assert!(effect.fallback_reason.is_some());
    assert_relative_eq!(effect.ate, 1.5, epsilon = 1e-9);
}

#[test]
fn test_unfitted_and_missing_columns() {
    let analyzer = CausalAnalyzer::default();
    assert!(matches!(analyzer.estimate_ate(), Err(DiagnosticsError::ModelNotFitted)));

    let mut analyzer = CausalAnalyzer::default();
    let err = analyzer
        .fit(&randomized(10), Variable::Column("dose".into()), Variable::Column("outcome".into()), None)
        .unwrap_err();
    assert!(matches!(err, DiagnosticsError::FeatureNotFound(_)));
}
