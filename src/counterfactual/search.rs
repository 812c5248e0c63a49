//! Greedy, random and genetic counterfactual search
//!
//! Each strategy sends its candidates to the model in batches and keeps the
//! ones whose prediction matches the desired outcome. Candidates identical to
//! the original instance are never kept.

use super::{Counterfactual, CounterfactualConfig, FeatureChange, SearchStrategy};
use crate::control::SearchBudget;
use crate::data::{Dataset, FeatureValue, Instance};
use crate::error::Result;
use crate::prediction::{predict_checked, DesiredOutcome, PredictionCapability};
use crate::stats::{FeatureStatistics, FeatureSummary};
use ndarray::Array1;
use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::cmp::Ordering;
use tracing::debug;

/// Mean per-feature distance between two instances over the features of `a`.
///
/// Categorical features (or non-numeric values) contribute 0/1 mismatch;
/// numeric features contribute `|a - b| / std`, or 0 when the fitted std is 0.
/// Features without fitted statistics use a std of 1.
pub(crate) fn distance(stats: &FeatureStatistics, a: &Instance, b: &Instance) -> f64 {
    let mut total = 0.0;
    let mut counted = 0usize;
    for (name, va) in a.iter() {
        let Some(vb) = b.get(name) else { continue };
        counted += 1;
        let summary = stats.get(name);
        let categorical = summary.map_or(false, FeatureSummary::is_categorical);
        match (va, vb) {
            (FeatureValue::Numeric(x), FeatureValue::Numeric(y)) if !categorical => {
                let std = match summary {
                    Some(FeatureSummary::Continuous { std, .. }) => *std,
                    _ => 1.0,
                };
                if std > 0.0 {
                    total += (x - y).abs() / std;
                }
            }
            _ => {
                if va != vb {
                    total += 1.0;
                }
            }
        }
    }
    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}

/// Result of running one strategy
#[derive(Debug, Default)]
pub(crate) struct StrategyOutcome {
    pub found: Vec<Counterfactual>,
    pub evaluated: usize,
    pub interrupted: bool,
}

/// Everything a strategy needs for one instance
pub(crate) struct SearchContext<'a, P: PredictionCapability + ?Sized> {
    pub original: &'a Instance,
    pub original_prediction: f64,
    pub stats: &'a FeatureStatistics,
    pub config: &'a CounterfactualConfig,
    /// Features that may change, all present in `stats`
    pub vary: Vec<String>,
    pub desired: &'a DesiredOutcome,
    pub predictor: &'a P,
    pub budget: &'a SearchBudget,
}

impl<'a, P: PredictionCapability + ?Sized> SearchContext<'a, P> {
    fn range_for(&self, feature: &str, min: f64, max: f64) -> (f64, f64) {
        self.config
            .permitted_range
            .get(feature)
            .copied()
            .unwrap_or((min, max))
    }

    fn evaluate(&self, batch: &[Instance]) -> Result<Array1<f64>> {
        if batch.is_empty() {
            return Ok(Array1::zeros(0));
        }
        let dataset = Dataset::from_instances(batch)?;
        predict_checked(self.predictor, &dataset)
    }

    /// Wrap a valid candidate; `None` when it changes nothing
    fn counterfactual(&self, candidate: Instance, prediction: f64, source: SearchStrategy) -> Option<Counterfactual> {
        let changes: Vec<FeatureChange> = self
            .original
            .iter()
            .filter_map(|(name, before)| {
                let after = candidate.get(name)?;
                (after != before).then(|| FeatureChange {
                    feature: name.to_string(),
                    from: before.clone(),
                    to: after.clone(),
                })
            })
            .collect();
        if changes.is_empty() {
            return None;
        }
        Some(Counterfactual {
            distance: distance(self.stats, self.original, &candidate),
            sparsity: changes.len(),
            original: self.original.clone(),
            counterfactual: candidate,
            original_prediction: self.original_prediction,
            counterfactual_prediction: prediction,
            changes,
            validity: true,
            source,
        })
    }

    /// Candidate replacement values for one feature, excluding the current value
    fn candidates(&self, feature: &str) -> Vec<FeatureValue> {
        let current = self.original.get(feature).cloned().unwrap_or(FeatureValue::Missing);
        match self.stats.get(feature) {
            Some(FeatureSummary::Categorical { values, .. }) => {
                values.iter().filter(|v| **v != current).cloned().collect()
            }
            Some(FeatureSummary::Continuous { mean, std, min, max, median }) => {
                let (lo, hi) = self.range_for(feature, *min, *max);
                let mut raw = vec![*mean, *median, mean + std, mean - std];
                raw.extend([0.1, 0.25, 0.5, 0.75, 0.9].iter().map(|p| lo + (hi - lo) * p));
                if let FeatureValue::Numeric(c) = current {
                    raw.extend([c * 1.1, c * 0.9, c + std, c - std]);
                }

                let mut out: Vec<f64> = Vec::with_capacity(raw.len());
                for v in raw.into_iter().filter(|v| v.is_finite()).map(|v| v.max(lo).min(hi)) {
                    if !out.iter().any(|o| (o - v).abs() <= f64::EPSILON * v.abs().max(1.0)) {
                        out.push(v);
                    }
                }
                out.into_iter()
                    .map(FeatureValue::Numeric)
                    .filter(|v| *v != current)
                    .collect()
            }
            None => Vec::new(),
        }
    }

    /// Draw a value from the feature's fitted distribution
    fn sample_value(&self, feature: &str, rng: &mut ChaCha8Rng) -> Option<FeatureValue> {
        match self.stats.get(feature)? {
            FeatureSummary::Categorical { values, .. } => values.choose(rng).cloned(),
            FeatureSummary::Continuous { mean, std, min, max, .. } => {
                let (lo, hi) = self.range_for(feature, *min, *max);
                let draw = Normal::new(*mean, *std)
                    .ok()
                    .filter(|_| *std > 0.0)
                    .map_or(*mean, |normal| normal.sample(rng));
                Some(FeatureValue::Numeric(draw.max(lo).min(hi)))
            }
        }
    }

    /// Copy of the original with 1..=max_changes random features resampled
    fn random_perturbation(&self, rng: &mut ChaCha8Rng) -> Instance {
        let mut candidate = self.original.clone();
        let limit = self.config.max_changes.min(self.vary.len());
        if limit == 0 {
            return candidate;
        }
        let n_changes = rng.gen_range(1..=limit);
        for idx in sample(rng, self.vary.len(), n_changes).into_vec() {
            let feature = &self.vary[idx];
            if let Some(value) = self.sample_value(feature, rng) {
                candidate.set(feature.clone(), value);
            }
        }
        candidate
    }

    fn keep_valid(
        &self,
        batch: Vec<Instance>,
        predictions: &Array1<f64>,
        source: SearchStrategy,
        outcome: &mut StrategyOutcome,
    ) {
        outcome.evaluated += batch.len();
        for (candidate, &prediction) in batch.into_iter().zip(predictions.iter()) {
            if self.desired.matches(prediction) {
                if let Some(cf) = self.counterfactual(candidate, prediction, source) {
                    outcome.found.push(cf);
                }
            }
        }
    }
}

/// Change one feature at a time; one batch per feature
pub(crate) fn greedy<P: PredictionCapability + ?Sized>(ctx: &SearchContext<'_, P>) -> Result<StrategyOutcome> {
    let mut outcome = StrategyOutcome::default();
    for feature in &ctx.vary {
        if ctx.budget.is_exhausted() {
            outcome.interrupted = true;
            break;
        }
        let batch: Vec<Instance> = ctx
            .candidates(feature)
            .into_iter()
            .map(|value| {
                let mut candidate = ctx.original.clone();
                candidate.set(feature.clone(), value);
                candidate
            })
            .collect();
        let predictions = ctx.evaluate(&batch)?;
        ctx.keep_valid(batch, &predictions, SearchStrategy::Greedy, &mut outcome);
    }
    debug!(valid = outcome.found.len(), evaluated = outcome.evaluated, "Greedy search done");
    Ok(outcome)
}

/// Independent random multi-feature perturbations, evaluated as one batch
pub(crate) fn random<P: PredictionCapability + ?Sized>(
    ctx: &SearchContext<'_, P>,
    rng: &mut ChaCha8Rng,
) -> Result<StrategyOutcome> {
    let mut outcome = StrategyOutcome::default();
    let mut batch = Vec::with_capacity(ctx.config.random_trials);
    for _ in 0..ctx.config.random_trials {
        if ctx.budget.is_exhausted() {
            outcome.interrupted = true;
            break;
        }
        batch.push(ctx.random_perturbation(rng));
    }
    if !outcome.interrupted || !batch.is_empty() {
        let predictions = ctx.evaluate(&batch)?;
        ctx.keep_valid(batch, &predictions, SearchStrategy::Random, &mut outcome);
    }
    debug!(valid = outcome.found.len(), evaluated = outcome.evaluated, "Random search done");
    Ok(outcome)
}

/// Elitist genetic search; valid individuals of every generation are kept
pub(crate) fn genetic<P: PredictionCapability + ?Sized>(
    ctx: &SearchContext<'_, P>,
    rng: &mut ChaCha8Rng,
) -> Result<StrategyOutcome> {
    let mut outcome = StrategyOutcome::default();
    let size = ctx.config.population_size;
    let elite_size = ((size as f64 * ctx.config.elite_fraction).floor() as usize).max(1);

    let mut population: Vec<Instance> = (0..size).map(|_| ctx.random_perturbation(rng)).collect();

    for generation in 0..ctx.config.generations {
        if ctx.budget.is_exhausted() {
            outcome.interrupted = true;
            break;
        }

        let predictions = ctx.evaluate(&population)?;
        let mut scored: Vec<(f64, usize)> = population
            .iter()
            .zip(predictions.iter())
            .enumerate()
            .map(|(i, (individual, &prediction))| {
                let validity = if ctx.desired.matches(prediction) { 1.0 } else { 0.0 };
                let d = distance(ctx.stats, ctx.original, individual);
                let fitness = ctx.config.validity_weight * validity + (1.0 - ctx.config.validity_weight) * (1.0 - d.min(1.0));
                (fitness, i)
            })
            .collect();
        ctx.keep_valid(population.clone(), &predictions, SearchStrategy::Genetic, &mut outcome);

        // Too small to breed
        if population.len() <= 2 {
            break;
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        let elite: Vec<Instance> = scored
            .iter()
            .take(elite_size)
            .map(|&(_, i)| population[i].clone())
            .collect();

        let mut next = elite.clone();
        while next.len() < size {
            let child = if elite.len() >= 2 {
                let parents = sample(rng, elite.len(), 2).into_vec();
                crossover(ctx, &elite[parents[0]], &elite[parents[1]], rng)
            } else {
                elite[0].clone()
            };
            next.push(mutate(ctx, child, rng));
        }
        population = next;
        debug!(generation, valid = outcome.found.len(), "Genetic generation evaluated");
    }
    Ok(outcome)
}

/// Child starts as `a` and takes each varied feature from `b` with probability 1/2
fn crossover<P: PredictionCapability + ?Sized>(
    ctx: &SearchContext<'_, P>,
    a: &Instance,
    b: &Instance,
    rng: &mut ChaCha8Rng,
) -> Instance {
    let mut child = a.clone();
    for feature in &ctx.vary {
        if rng.gen_bool(0.5) {
            if let Some(value) = b.get(feature) {
                child.set(feature.clone(), value.clone());
            }
        }
    }
    child
}

fn mutate<P: PredictionCapability + ?Sized>(
    ctx: &SearchContext<'_, P>,
    mut individual: Instance,
    rng: &mut ChaCha8Rng,
) -> Instance {
    let rate = ctx.config.mutation_rate.clamp(0.0, 1.0);
    for feature in &ctx.vary {
        if rng.gen_bool(rate) {
            if let Some(value) = ctx.sample_value(feature, rng) {
                individual.set(feature.clone(), value);
            }
        }
    }
    individual
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> FeatureStatistics {
        let ds = Dataset::new()
            .with_continuous("age", vec![20.0, 30.0, 40.0, 50.0])
            .unwrap()
            .with_categorical("job", vec!["a", "b", "a", "c"])
            .unwrap();
        FeatureStatistics::fit(&ds, &[]).unwrap()
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let s = stats();
        let x = Instance::new().with("age", 33.0).with("job", "b");
        assert_eq!(distance(&s, &x, &x), 0.0);
    }

    #[test]
    fn test_distance_mixes_kinds() {
        let s = stats();
        let std = s.std_of("age").unwrap();
        let x = Instance::new().with("age", 30.0).with("job", "a");
        let y = Instance::new().with("age", 30.0 + std).with("job", "b");
        // (1 + 1) / 2
        assert!((distance(&s, &x, &y) - 1.0).abs() < 1e-12);
        assert!((distance(&s, &x, &y) - distance(&s, &y, &x)).abs() < 1e-12);
    }
}
