//! Causal analysis
//!
//! Estimates how much an outcome moves when a treatment variable changes,
//! adjusting for confounders, and extrapolates that effect to what-if
//! scenarios and policies.
//!
//! The estimation method is fixed when the analyzer is built. If it fails at
//! fit time the analyzer falls back to the correlation slope and records the
//! reason, so every [`TreatmentEffect`] states which method produced it.

mod estimators;

pub use estimators::{
    estimator_for, CateModel, CausalMethod, EffectEstimator, EffectInputs, FittedEffect, LinearEffect,
    SimpleEffect, SingleModelEffect, TwoModelEffect,
};

use crate::control::SearchBudget;
use crate::data::{ColumnEncoding, Dataset, FeatureValue};
use crate::error::{DiagnosticsError, Result};
use crate::stats::{self, FeatureStatistics};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const Z_95: f64 = 1.96;

/// Causal analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalConfig {
    pub method: CausalMethod,
    /// Confounder columns; every other column of `x` when `None`
    pub confounders: Option<Vec<String>>,
    /// Names for a treatment passed as raw values
    pub treatment_features: Vec<String>,
    pub forest_trees: usize,
    pub forest_max_depth: usize,
    pub boosting_rounds: usize,
    pub boosting_max_depth: usize,
    /// ATE standard error as a fraction of |ATE| when no CATE exists
    pub ate_std_fraction: f64,
    /// Scenario and policy standard error as a fraction of |effect|
    pub effect_std_fraction: f64,
    pub high_priority_threshold: f64,
    pub medium_priority_threshold: f64,
    /// |ATE| below this reads as negligible
    pub negligible_effect: f64,
    pub random_state: Option<u64>,
}

impl Default for CausalConfig {
    fn default() -> Self {
        Self {
            method: CausalMethod::Linear,
            confounders: None,
            treatment_features: Vec::new(),
            forest_trees: 50,
            forest_max_depth: 5,
            boosting_rounds: 50,
            boosting_max_depth: 3,
            ate_std_fraction: 0.1,
            effect_std_fraction: 0.15,
            high_priority_threshold: 0.1,
            medium_priority_threshold: 0.05,
            negligible_effect: 0.01,
            random_state: Some(42),
        }
    }
}

impl CausalConfig {
    pub fn with_method(mut self, method: CausalMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_confounders<S: Into<String>>(mut self, confounders: Vec<S>) -> Self {
        self.confounders = Some(confounders.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_treatment_features<S: Into<String>>(mut self, features: Vec<S>) -> Self {
        self.treatment_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: String, reason: &str| DiagnosticsError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };
        if self.forest_trees == 0 {
            return Err(invalid("forest_trees", "0".into(), "must be at least 1"));
        }
        if self.forest_max_depth == 0 {
            return Err(invalid("forest_max_depth", "0".into(), "must be at least 1"));
        }
        if self.boosting_max_depth == 0 {
            return Err(invalid("boosting_max_depth", "0".into(), "must be at least 1"));
        }
        for (name, value) in [
            ("ate_std_fraction", self.ate_std_fraction),
            ("effect_std_fraction", self.effect_std_fraction),
            ("negligible_effect", self.negligible_effect),
        ] {
            if !(value >= 0.0) {
                return Err(invalid(name, value.to_string(), "must be non-negative"));
            }
        }
        if !(self.high_priority_threshold >= self.medium_priority_threshold) {
            return Err(invalid(
                "high_priority_threshold",
                self.high_priority_threshold.to_string(),
                "must not be below medium_priority_threshold",
            ));
        }
        Ok(())
    }
}

/// Treatment or outcome, named in `x` or given directly
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Column(String),
    Values(Array1<f64>),
}

impl Variable {
    fn name(&self) -> Option<&str> {
        match self {
            Variable::Column(name) => Some(name),
            Variable::Values(_) => None,
        }
    }

    fn resolve(&self, x: &Dataset, what: &str, expected: usize) -> Result<Array1<f64>> {
        let values = match self {
            Variable::Column(name) => x.numeric_column(name)?,
            Variable::Values(values) => values.clone(),
        };
        if values.len() != expected {
            return Err(DiagnosticsError::length_mismatch(what, expected, values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DiagnosticsError::DataError(format!("{} contains non-finite values", what)));
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentEffect {
    pub treatment: String,
    pub outcome: String,
    pub method_requested: CausalMethod,
    pub method_used: CausalMethod,
    pub fallback_reason: Option<String>,
    pub ate: f64,
    pub ate_std: f64,
    pub cate: Option<Array1<f64>>,
    pub confidence_interval: (f64, f64),
    /// The confidence interval excludes zero
    pub is_significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfScenario {
    pub name: String,
    /// New absolute value per feature
    pub changes: Vec<(String, f64)>,
}

impl WhatIfScenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: Vec::new(),
        }
    }

    pub fn set(mut self, feature: impl Into<String>, value: f64) -> Self {
        self.changes.push((feature.into(), value));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfResult {
    pub scenario_name: String,
    pub treatment_changes: Vec<(String, f64)>,
    pub predicted_outcome_change: f64,
    pub confidence_interval: (f64, f64),
    /// Percent of rows whose treatment differs from the scenario value;
    /// `None` when no changed treatment is a column of `x`
    pub affected_population_pct: Option<f64>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub target_population: String,
    /// Change applied to each treatment feature
    pub intervention: Vec<(String, f64)>,
    pub cost: Option<f64>,
}

impl Policy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_population: "all".to_string(),
            intervention: Vec::new(),
            cost: None,
        }
    }

    pub fn target(mut self, population: impl Into<String>) -> Self {
        self.target_population = population.into();
        self
    }

    pub fn change(mut self, feature: impl Into<String>, delta: f64) -> Self {
        self.intervention.push((feature.into(), delta));
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEffect {
    pub policy_name: String,
    pub target_population: String,
    /// Expected per-row change in the outcome
    pub expected_outcome_improvement: f64,
    /// Per-row change summed over the rows of `x`
    pub expected_total_improvement: f64,
    pub confidence_interval: (f64, f64),
    pub cost_benefit_ratio: Option<f64>,
    pub implementation_priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CateStatistics {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub positive_pct: f64,
}

impl CateStatistics {
    fn from_values(cate: &Array1<f64>) -> Option<Self> {
        let values = cate.to_vec();
        let mean = stats::mean(&values)?;
        Some(Self {
            mean,
            std: stats::std_dev(&values, 0).unwrap_or(0.0),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            positive_pct: values.iter().filter(|&&v| v > 0.0).count() as f64 / values.len() as f64 * 100.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalSummary {
    pub method_requested: CausalMethod,
    pub method_used: CausalMethod,
    pub fallback_reason: Option<String>,
    pub treatment_features: Vec<String>,
    pub outcome_feature: Option<String>,
    pub confounders: Vec<String>,
    pub ate: f64,
    pub cate_statistics: Option<CateStatistics>,
    pub interpretation: String,
}

#[derive(Debug, Clone)]
struct FittedState {
    effect: FittedEffect,
    method_used: CausalMethod,
    fallback_reason: Option<String>,
    treatment_features: Vec<String>,
    outcome_feature: Option<String>,
    /// Confounder columns with their fit-time encodings
    confounders: Vec<(String, ColumnEncoding)>,
    /// Fit-time means, treatment features included
    means: BTreeMap<String, f64>,
}

/// Treatment effect estimator with what-if and policy extrapolation
#[derive(Debug)]
pub struct CausalAnalyzer {
    config: CausalConfig,
    estimator: Box<dyn EffectEstimator>,
    state: Option<FittedState>,
}

impl Default for CausalAnalyzer {
    fn default() -> Self {
        Self::new(CausalConfig::default())
    }
}

impl CausalAnalyzer {
    pub fn new(config: CausalConfig) -> Self {
        let estimator = estimator_for(config.method, &config);
        Self {
            config,
            estimator,
            state: None,
        }
    }

    pub fn config(&self) -> &CausalConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn fitted(&self) -> Result<&FittedState> {
        self.state.as_ref().ok_or(DiagnosticsError::ModelNotFitted)
    }

    pub fn fit(
        &mut self,
        x: &Dataset,
        treatment: Variable,
        outcome: Variable,
        confounders: Option<&Dataset>,
    ) -> Result<&mut Self> {
        self.fit_within(x, treatment, outcome, confounders, &SearchBudget::unbounded())
    }

    /// Like [`Self::fit`], refusing to start once `budget` is exhausted
    pub fn fit_within(
        &mut self,
        x: &Dataset,
        treatment: Variable,
        outcome: Variable,
        confounders: Option<&Dataset>,
        budget: &SearchBudget,
    ) -> Result<&mut Self> {
        self.config.validate()?;

        let n = if x.n_cols() > 0 {
            x.n_rows()
        } else {
            match &treatment {
                Variable::Values(v) => v.len(),
                Variable::Column(name) => return Err(DiagnosticsError::FeatureNotFound(name.clone())),
            }
        };
        let t = treatment.resolve(x, "treatment", n)?;
        let y = outcome.resolve(x, "outcome", n)?;
        if n < 2 {
            return Err(DiagnosticsError::DataError(
                "causal estimation needs at least two samples".to_string(),
            ));
        }

        let treatment_features = match treatment.name() {
            Some(name) => vec![name.to_string()],
            None => self.config.treatment_features.clone(),
        };
        let outcome_feature = outcome.name().map(str::to_string);

        let (confounder_encodings, w) = self.confounder_matrix(x, confounders, &treatment_features, outcome_feature.as_deref(), n)?;

        let mut means: BTreeMap<String, f64> = BTreeMap::new();
        if x.n_cols() > 0 {
            let feature_stats = FeatureStatistics::fit(x, &[])?;
            for name in x.column_names() {
                if let Some(mean) = feature_stats.mean_of(name) {
                    means.insert(name.clone(), mean);
                }
            }
        }
        let t_mean = t.mean().unwrap_or(0.0);
        for name in &treatment_features {
            means.insert(name.clone(), t_mean);
        }

        if budget.is_exhausted() {
            return Err(DiagnosticsError::ComputationError("cancelled".to_string()));
        }

        let inputs = EffectInputs {
            treatment: &t,
            outcome: &y,
            confounders: w.as_ref(),
        };
        let requested = self.estimator.method();
        let (effect, method_used, fallback_reason) = match self.estimator.fit(&inputs) {
            Ok(effect) => (effect, requested, None),
            Err(e) if requested != CausalMethod::Simple => {
                warn!(method = %requested, error = %e, "Causal estimator failed, falling back to simple");
                if budget.is_exhausted() {
                    return Err(DiagnosticsError::ComputationError("cancelled".to_string()));
                }
                (SimpleEffect.fit(&inputs)?, CausalMethod::Simple, Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        info!(
            method = %method_used,
            samples = n,
            confounders = confounder_encodings.len(),
            ate = effect.ate,
            "Causal model fitted"
        );

        self.state = Some(FittedState {
            effect,
            method_used,
            fallback_reason,
            treatment_features,
            outcome_feature,
            confounders: confounder_encodings,
            means,
        });
        Ok(self)
    }

    fn confounder_matrix(
        &self,
        x: &Dataset,
        confounders: Option<&Dataset>,
        treatment_features: &[String],
        outcome_feature: Option<&str>,
        n: usize,
    ) -> Result<(Vec<(String, ColumnEncoding)>, Option<Array2<f64>>)> {
        let frame = match (confounders, &self.config.confounders) {
            (Some(w), _) => {
                if w.n_rows() != n {
                    return Err(DiagnosticsError::length_mismatch("confounders", n, w.n_rows()));
                }
                w.clone()
            }
            (None, Some(names)) => x.select_columns(names)?,
            (None, None) => {
                let mut excluded: Vec<&str> = treatment_features.iter().map(String::as_str).collect();
                excluded.extend(outcome_feature);
                x.without_columns(&excluded)
            }
        };
        if frame.n_cols() == 0 {
            return Ok((Vec::new(), None));
        }
        Ok((frame.encodings(), Some(frame.to_matrix())))
    }

    pub fn estimate_ate(&self) -> Result<TreatmentEffect> {
        let state = self.fitted()?;
        let ate = state.effect.ate;
        let ate_std = match &state.effect.cate {
            Some(cate) if !cate.is_empty() => {
                stats::std_dev(&cate.to_vec(), 0).unwrap_or(0.0) / (cate.len() as f64).sqrt()
            }
            _ => ate.abs() * self.config.ate_std_fraction,
        };
        let ci = (ate - Z_95 * ate_std, ate + Z_95 * ate_std);
        Ok(TreatmentEffect {
            treatment: state
                .treatment_features
                .first()
                .cloned()
                .unwrap_or_else(|| "treatment".to_string()),
            outcome: state.outcome_feature.clone().unwrap_or_else(|| "outcome".to_string()),
            method_requested: self.config.method,
            method_used: state.method_used,
            fallback_reason: state.fallback_reason.clone(),
            ate,
            ate_std,
            cate: state.effect.cate.clone(),
            confidence_interval: ci,
            is_significant: ci.0 > 0.0 || ci.1 < 0.0,
        })
    }

    /// Per-row effects on `x`. Learners score `x` when it has the fitted
    /// confounder columns, encoded as they were at fit time; otherwise every
    /// row gets the ATE. A category unseen at fit time is a `DataError`.
    pub fn estimate_cate(&self, x: &Dataset) -> Result<Array1<f64>> {
        let state = self.fitted()?;
        let n = x.n_rows();
        if let Some(model) = &state.effect.model {
            let has_columns = state.confounders.iter().all(|(c, _)| x.column(c).is_some());
            if n > 0 && has_columns {
                let w = if state.confounders.is_empty() {
                    Array2::ones((n, 1))
                } else {
                    x.to_matrix_with(&state.confounders)?
                };
                return model.predict(&w);
            }
        }
        Ok(Array1::from_elem(n, state.effect.ate))
    }

    /// Linear extrapolation of the ATE to new treatment levels
    pub fn what_if_analysis(&self, x: &Dataset, scenarios: &[WhatIfScenario]) -> Result<Vec<WhatIfResult>> {
        let state = self.fitted()?;
        let ate = state.effect.ate;

        let results = scenarios
            .iter()
            .map(|scenario| {
                let treatment_changes: Vec<(String, f64)> = scenario
                    .changes
                    .iter()
                    .filter(|(f, _)| state.treatment_features.contains(f))
                    .cloned()
                    .collect();

                let effect: f64 = treatment_changes
                    .iter()
                    .map(|(f, value)| ate * (value - state.means.get(f).copied().unwrap_or(0.0)))
                    .sum();
                let effect_std = effect.abs() * self.config.effect_std_fraction;

                let recommendation = if effect > 0.0 {
                    format!("Scenario '{}' is expected to raise the outcome by {:.3}", scenario.name, effect)
                } else if effect < 0.0 {
                    format!("Scenario '{}' is expected to lower the outcome by {:.3}", scenario.name, effect.abs())
                } else {
                    format!("Scenario '{}' is not expected to change the outcome", scenario.name)
                };

                WhatIfResult {
                    scenario_name: scenario.name.clone(),
                    affected_population_pct: affected_pct(x, &treatment_changes),
                    treatment_changes,
                    predicted_outcome_change: effect,
                    confidence_interval: (effect - Z_95 * effect_std, effect + Z_95 * effect_std),
                    recommendations: vec![recommendation],
                }
            })
            .collect();
        Ok(results)
    }

    /// Expected effect of shifting treatments by fixed amounts
    pub fn analyze_policy(&self, x: &Dataset, policies: &[Policy]) -> Result<Vec<PolicyEffect>> {
        let state = self.fitted()?;
        let ate = state.effect.ate;

        let results = policies
            .iter()
            .map(|policy| {
                let effect: f64 = policy
                    .intervention
                    .iter()
                    .filter(|(f, _)| state.treatment_features.contains(f))
                    .map(|(_, delta)| ate * delta)
                    .sum();
                let effect_std = effect.abs() * self.config.effect_std_fraction;
                let priority = if effect.abs() > self.config.high_priority_threshold {
                    Priority::High
                } else if effect.abs() > self.config.medium_priority_threshold {
                    Priority::Medium
                } else {
                    Priority::Low
                };

                PolicyEffect {
                    policy_name: policy.name.clone(),
                    target_population: policy.target_population.clone(),
                    expected_outcome_improvement: effect,
                    expected_total_improvement: effect * x.n_rows() as f64,
                    confidence_interval: (effect - Z_95 * effect_std, effect + Z_95 * effect_std),
                    cost_benefit_ratio: policy.cost.filter(|&c| c > 0.0).map(|c| effect / c),
                    implementation_priority: priority,
                }
            })
            .collect();
        Ok(results)
    }

    pub fn get_causal_summary(&self) -> Result<CausalSummary> {
        let state = self.fitted()?;
        let ate = state.effect.ate;
        let interpretation = if ate.abs() < self.config.negligible_effect {
            "The treatment has a negligible effect on the outcome.".to_string()
        } else if ate > 0.0 {
            format!("A one-unit increase in the treatment raises the outcome by about {:.3}.", ate)
        } else {
            format!("A one-unit increase in the treatment lowers the outcome by about {:.3}.", ate.abs())
        };

        Ok(CausalSummary {
            method_requested: self.config.method,
            method_used: state.method_used,
            fallback_reason: state.fallback_reason.clone(),
            treatment_features: state.treatment_features.clone(),
            outcome_feature: state.outcome_feature.clone(),
            confounders: state.confounders.iter().map(|(name, _)| name.clone()).collect(),
            ate,
            cate_statistics: state.effect.cate.as_ref().and_then(CateStatistics::from_values),
            interpretation,
        })
    }
}

/// Percent of rows where some changed treatment differs from its scenario value
fn affected_pct(x: &Dataset, changes: &[(String, f64)]) -> Option<f64> {
    let columns: Vec<(&crate::data::Column, f64)> = changes
        .iter()
        .filter_map(|(f, value)| x.column(f).map(|c| (c, *value)))
        .collect();
    if columns.is_empty() || x.n_rows() == 0 {
        return None;
    }
    let affected = (0..x.n_rows())
        .filter(|&row| {
            columns.iter().any(|(column, value)| match column.value(row) {
                FeatureValue::Numeric(v) => (v - value).abs() > f64::EPSILON,
                _ => true,
            })
        })
        .count();
    Some(affected as f64 / x.n_rows() as f64 * 100.0)
}
