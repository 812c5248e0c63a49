//! Counterfactual explanations
//!
//! For one instance, find nearby instances the model predicts differently:
//! "had `age` been 38 instead of 50, the prediction would have been 1".
//! Three strategies run in turn (greedy single-feature changes, random
//! multi-feature perturbations, a small genetic search) and the closest
//! candidates with pairwise-different change sets are kept.

mod search;

use crate::control::SearchBudget;
use crate::data::{Dataset, FeatureValue, Instance};
use crate::error::{DiagnosticsError, Result};
use crate::prediction::{predict_checked, DesiredOutcome, PredictionCapability};
use crate::stats::{FeatureStatistics, FeatureSummary};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use search::SearchContext;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Counterfactual search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterfactualConfig {
    /// Counterfactuals kept per instance
    pub num_counterfactuals: usize,
    /// Features allowed to change; all fitted features when `None`
    pub features_to_vary: Option<Vec<String>>,
    /// Bounds for continuous features; fitted min/max otherwise
    pub permitted_range: HashMap<String, (f64, f64)>,
    pub random_trials: usize,
    /// Upper bound on features changed by one random perturbation
    pub max_changes: usize,
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub elite_fraction: f64,
    /// Weight of validity in the genetic fitness; the rest rewards proximity
    pub validity_weight: f64,
    pub random_state: Option<u64>,
}

impl Default for CounterfactualConfig {
    fn default() -> Self {
        Self {
            num_counterfactuals: 5,
            features_to_vary: None,
            permitted_range: HashMap::new(),
            random_trials: 100,
            max_changes: 3,
            population_size: 50,
            generations: 20,
            mutation_rate: 0.1,
            elite_fraction: 0.25,
            validity_weight: 0.7,
            random_state: Some(42),
        }
    }
}

impl CounterfactualConfig {
    pub fn with_num_counterfactuals(mut self, n: usize) -> Self {
        self.num_counterfactuals = n;
        self
    }

    pub fn with_features_to_vary<S: Into<String>>(mut self, features: Vec<S>) -> Self {
        self.features_to_vary = Some(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_permitted_range(mut self, feature: impl Into<String>, min: f64, max: f64) -> Self {
        self.permitted_range.insert(feature.into(), (min, max));
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
        if self.num_counterfactuals == 0 {
            return Err(invalid("num_counterfactuals", "0".into(), "must be at least 1"));
        }
        if self.max_changes == 0 {
            return Err(invalid("max_changes", "0".into(), "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(invalid("mutation_rate", self.mutation_rate.to_string(), "must be in [0, 1]"));
        }
        if !(self.elite_fraction > 0.0 && self.elite_fraction <= 1.0) {
            return Err(invalid("elite_fraction", self.elite_fraction.to_string(), "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.validity_weight) {
            return Err(invalid("validity_weight", self.validity_weight.to_string(), "must be in [0, 1]"));
        }
        for (feature, (lo, hi)) in &self.permitted_range {
            if !(lo <= hi) {
                return Err(invalid(
                    "permitted_range",
                    format!("{}: ({}, {})", feature, lo, hi),
                    "lower bound must not exceed upper bound",
                ));
            }
        }
        Ok(())
    }
}

/// Strategy that produced a counterfactual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SearchStrategy {
    Greedy,
    Random,
    Genetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureChange {
    pub feature: String,
    pub from: FeatureValue,
    pub to: FeatureValue,
}

/// Instance reaching the desired prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterfactual {
    pub original: Instance,
    pub counterfactual: Instance,
    pub original_prediction: f64,
    pub counterfactual_prediction: f64,
    /// Changed features in instance order
    pub changes: Vec<FeatureChange>,
    pub distance: f64,
    /// Number of changed features
    pub sparsity: usize,
    pub validity: bool,
    pub source: SearchStrategy,
}

impl Counterfactual {
    fn changed_features(&self) -> BTreeSet<&str> {
        self.changes.iter().map(|c| c.feature.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EasiestChange {
    pub changes: Vec<FeatureChange>,
    pub distance: f64,
    pub sparsity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualSummary {
    pub num_counterfactuals_found: usize,
    pub minimum_changes_required: Option<usize>,
    pub easiest_change: Option<EasiestChange>,
    /// How often each feature changes across the kept counterfactuals, top 5
    pub most_important_features: Vec<(String, usize)>,
    pub recommendations: Vec<String>,
    pub message: Option<String>,
}

/// Valid candidates found by each strategy before diversity selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyYields {
    pub greedy: usize,
    pub random: usize,
    pub genetic: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualExplanation {
    pub instance_id: usize,
    pub original_instance: Instance,
    pub original_prediction: f64,
    pub desired_outcome: DesiredOutcome,
    /// Closest first
    pub counterfactuals: Vec<Counterfactual>,
    pub summary: CounterfactualSummary,
    pub candidates_evaluated: usize,
    pub strategy_yields: StrategyYields,
    /// The search budget ran out before every strategy finished
    pub interrupted: bool,
}

/// Counterfactual generator. Fit once on reference data, then query.
#[derive(Debug, Clone, Default)]
pub struct CounterfactualAnalyzer {
    config: CounterfactualConfig,
    stats: Option<FeatureStatistics>,
}

impl CounterfactualAnalyzer {
    pub fn new(config: CounterfactualConfig) -> Self {
        Self { config, stats: None }
    }

    pub fn config(&self) -> &CounterfactualConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.stats.is_some()
    }

    pub fn feature_statistics(&self) -> Option<&FeatureStatistics> {
        self.stats.as_ref()
    }

    /// Learn value sets and ranges from reference data
    pub fn fit(&mut self, x: &Dataset, categorical_features: Option<&[String]>) -> Result<&mut Self> {
        self.config.validate()?;
        if x.is_empty() {
            return Err(DiagnosticsError::DataError("cannot fit on an empty dataset".to_string()));
        }
        if let Some(vary) = &self.config.features_to_vary {
            if let Some(missing) = vary.iter().find(|f| x.column(f).is_none()) {
                return Err(DiagnosticsError::FeatureNotFound(missing.clone()));
            }
        }
        let stats = FeatureStatistics::fit(x, categorical_features.unwrap_or(&[]))?;
        info!(features = stats.len(), rows = x.n_rows(), "Counterfactual analyzer fitted");
        self.stats = Some(stats);
        Ok(self)
    }

    fn fitted(&self) -> Result<&FeatureStatistics> {
        self.stats.as_ref().ok_or(DiagnosticsError::ModelNotFitted)
    }

    /// Distance used to rank counterfactuals; 0 for identical instances
    pub fn distance(&self, a: &Instance, b: &Instance) -> Result<f64> {
        Ok(search::distance(self.fitted()?, a, b))
    }

    pub fn generate_counterfactuals<P: PredictionCapability + ?Sized>(
        &self,
        instance: &Instance,
        predict: &P,
        desired: &DesiredOutcome,
        instance_id: usize,
    ) -> Result<CounterfactualExplanation> {
        self.generate_counterfactuals_within(instance, predict, desired, instance_id, &SearchBudget::unbounded())
    }

    /// Like [`Self::generate_counterfactuals`], stopping early once `budget`
    /// is exhausted. Whatever was found so far is still returned.
    pub fn generate_counterfactuals_within<P: PredictionCapability + ?Sized>(
        &self,
        instance: &Instance,
        predict: &P,
        desired: &DesiredOutcome,
        instance_id: usize,
        budget: &SearchBudget,
    ) -> Result<CounterfactualExplanation> {
        let stats = self.fitted()?;
        if instance.is_empty() {
            return Err(DiagnosticsError::ValidationError("instance has no features".to_string()));
        }

        let original_prediction = predict_checked(predict, &instance.to_dataset()?)?[0];

        let vary: Vec<String> = match &self.config.features_to_vary {
            Some(features) => features.clone(),
            None => instance.names().map(str::to_string).collect(),
        };
        if let Some(missing) = vary.iter().find(|f| instance.get(f).is_none()) {
            return Err(DiagnosticsError::FeatureNotFound(missing.clone()));
        }
        let vary: Vec<String> = vary.into_iter().filter(|f| stats.get(f).is_some()).collect();

        let ctx = SearchContext {
            original: instance,
            original_prediction,
            stats,
            config: &self.config,
            vary,
            desired,
            predictor: predict,
            budget,
        };
        let seed = self
            .config
            .random_state
            .map(|s| s.wrapping_add(instance_id as u64));
        let mut rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut yields = StrategyYields::default();
        let mut evaluated = 0;
        let mut interrupted = false;
        let mut found = Vec::new();

        let greedy = search::greedy(&ctx)?;
        yields.greedy = greedy.found.len();
        evaluated += greedy.evaluated;
        interrupted |= greedy.interrupted;
        found.extend(greedy.found);

        if !interrupted {
            let random = search::random(&ctx, &mut rng)?;
            yields.random = random.found.len();
            evaluated += random.evaluated;
            interrupted |= random.interrupted;
            found.extend(random.found);
        }

        if !interrupted {
            let genetic = search::genetic(&ctx, &mut rng)?;
            yields.genetic = genetic.found.len();
            evaluated += genetic.evaluated;
            interrupted |= genetic.interrupted;
            found.extend(genetic.found);
        }

        if interrupted {
            warn!(instance_id, evaluated, "Counterfactual search stopped by budget");
        }

        let counterfactuals = select_diverse(found, self.config.num_counterfactuals);
        let summary = summarize(&counterfactuals, instance, stats);
        debug!(
            instance_id,
            kept = counterfactuals.len(),
            greedy = yields.greedy,
            random = yields.random,
            genetic = yields.genetic,
            "Counterfactual search finished"
        );

        Ok(CounterfactualExplanation {
            instance_id,
            original_instance: instance.clone(),
            original_prediction,
            desired_outcome: desired.clone(),
            counterfactuals,
            summary,
            candidates_evaluated: evaluated,
            strategy_yields: yields,
            interrupted,
        })
    }

    /// Explain every row of `instances`; instance ids are row indices
    pub fn explain_batch<P: PredictionCapability + ?Sized>(
        &self,
        instances: &Dataset,
        predict: &P,
        desired: &DesiredOutcome,
    ) -> Result<Vec<CounterfactualExplanation>> {
        self.explain_batch_within(instances, predict, desired, &SearchBudget::unbounded())
    }

    /// Stops after the first interrupted explanation, which is included
    pub fn explain_batch_within<P: PredictionCapability + ?Sized>(
        &self,
        instances: &Dataset,
        predict: &P,
        desired: &DesiredOutcome,
        budget: &SearchBudget,
    ) -> Result<Vec<CounterfactualExplanation>> {
        self.fitted()?;
        let mut explanations = Vec::with_capacity(instances.n_rows());
        for row in 0..instances.n_rows() {
            let instance = instances.row(row)?;
            let explanation = self.generate_counterfactuals_within(&instance, predict, desired, row, budget)?;
            let stop = explanation.interrupted;
            explanations.push(explanation);
            if stop {
                break;
            }
        }
        info!(
            requested = instances.n_rows(),
            explained = explanations.len(),
            "Counterfactual batch explained"
        );
        Ok(explanations)
    }
}

/// Closest candidate first, then candidates whose change set differs from
/// every one already kept
fn select_diverse(mut candidates: Vec<Counterfactual>, limit: usize) -> Vec<Counterfactual> {
    candidates.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
    let mut selected: Vec<Counterfactual> = Vec::with_capacity(limit);
    for candidate in candidates {
        if selected.len() >= limit {
            break;
        }
        let features = candidate.changed_features();
        if selected.iter().all(|s| s.changed_features() != features) {
            selected.push(candidate);
        }
    }
    selected
}

fn summarize(counterfactuals: &[Counterfactual], original: &Instance, stats: &FeatureStatistics) -> CounterfactualSummary {
    let Some(easiest) = counterfactuals
        .iter()
        .reduce(|best, cf| if cf.sparsity < best.sparsity { cf } else { best })
    else {
        return CounterfactualSummary {
            message: Some("no valid counterfactual found".to_string()),
            ..CounterfactualSummary::default()
        };
    };

    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for cf in counterfactuals {
        for change in &cf.changes {
            *frequency.entry(change.feature.as_str()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = frequency.into_iter().map(|(f, n)| (f.to_string(), n)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(5);

    CounterfactualSummary {
        num_counterfactuals_found: counterfactuals.len(),
        minimum_changes_required: Some(easiest.sparsity),
        easiest_change: Some(EasiestChange {
            changes: easiest.changes.clone(),
            distance: easiest.distance,
            sparsity: easiest.sparsity,
        }),
        recommendations: recommendations(counterfactuals, &ranked, original, stats),
        most_important_features: ranked,
        message: None,
    }
}

fn recommendations(
    counterfactuals: &[Counterfactual],
    ranked: &[(String, usize)],
    original: &Instance,
    stats: &FeatureStatistics,
) -> Vec<String> {
    let mut out = Vec::new();
    for (feature, _) in ranked.iter().take(3) {
        let new_values: Vec<&FeatureValue> = counterfactuals
            .iter()
            .flat_map(|cf| cf.changes.iter())
            .filter(|c| &c.feature == feature)
            .map(|c| &c.to)
            .collect();
        let Some(current) = original.get(feature) else { continue };

        if matches!(stats.get(feature), Some(FeatureSummary::Categorical { .. })) {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for v in &new_values {
                *counts.entry(v.to_string()).or_insert(0) += 1;
            }
            if let Some((value, _)) = counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            {
                out.push(format!("Change '{}' from '{}' to '{}'", feature, current, value));
            }
            continue;
        }

        let numeric: Vec<f64> = new_values.iter().filter_map(|v| v.as_f64()).collect();
        let (Some(cur), Some(suggested)) = (current.as_f64(), crate::stats::mean(&numeric)) else {
            continue;
        };
        let direction = if suggested > cur { "Increase" } else { "Decrease" };
        out.push(format!(
            "{} '{}' (current: {:.2}, suggested: {:.2})",
            direction, feature, cur, suggested
        ));
    }
    out
}
