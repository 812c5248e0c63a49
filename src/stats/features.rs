//! Per-feature summaries fitted once and shared by the analyzers

use super::{mean, median, std_dev};
use crate::data::{Column, Dataset, FeatureValue};
use crate::error::{DiagnosticsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureSummary {
    Categorical {
        /// Distinct values, most frequent first
        values: Vec<FeatureValue>,
        mode: FeatureValue,
    },
    Continuous {
        mean: f64,
        /// Sample standard deviation (ddof = 1), 0 when undefined
        std: f64,
        min: f64,
        max: f64,
        median: f64,
    },
}

impl FeatureSummary {
    pub fn is_categorical(&self) -> bool {
        matches!(self, FeatureSummary::Categorical { .. })
    }

    fn categorical(column: &Column) -> Self {
        let mut counts: BTreeMap<String, (FeatureValue, usize)> = BTreeMap::new();
        for row in 0..column.len() {
            let value = column.value(row);
            let Some(key) = value.key() else {
                continue;
            };
            counts.entry(key).or_insert((value, 0)).1 += 1;
        }
        let mut ranked: Vec<(String, (FeatureValue, usize))> = counts.into_iter().collect();
        // Count descending, then by rendered value for determinism
        ranked.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then_with(|| a.0.cmp(&b.0)));
        let values: Vec<FeatureValue> = ranked.into_iter().map(|(_, (v, _))| v).collect();
        let mode = values.first().cloned().unwrap_or(FeatureValue::Missing);
        FeatureSummary::Categorical { values, mode }
    }

    fn continuous(column: &Column) -> Self {
        let values = column.numeric_values();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        FeatureSummary::Continuous {
            mean: mean(&values).unwrap_or(0.0),
            std: std_dev(&values, 1).unwrap_or(0.0),
            min: if min.is_finite() { min } else { 0.0 },
            max: if max.is_finite() { max } else { 0.0 },
            median: median(&values).unwrap_or(0.0),
        }
    }
}

/// Fitted summaries in dataset column order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureStatistics {
    features: Vec<(String, FeatureSummary)>,
}

impl FeatureStatistics {
    /// Summarize every column. A column is categorical when it stores strings
    /// or its name appears in `categorical_features`.
    pub fn fit(dataset: &Dataset, categorical_features: &[String]) -> Result<Self> {
        if let Some(missing) = categorical_features.iter().find(|n| dataset.column(n).is_none()) {
            return Err(DiagnosticsError::FeatureNotFound(missing.clone()));
        }
        let features = dataset
            .columns()
            .map(|(name, column)| {
                let summary = if column.is_categorical() || categorical_features.iter().any(|c| c == name) {
                    FeatureSummary::categorical(column)
                } else {
                    FeatureSummary::continuous(column)
                };
                (name.to_string(), summary)
            })
            .collect();
        Ok(Self { features })
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSummary> {
        self.features.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureSummary)> {
        self.features.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.get(name).map_or(false, FeatureSummary::is_categorical)
    }

    /// Continuous mean, if the feature is continuous
    pub fn mean_of(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            FeatureSummary::Continuous { mean, .. } => Some(*mean),
            FeatureSummary::Categorical { .. } => None,
        }
    }

    /// Continuous standard deviation, if the feature is continuous
    pub fn std_of(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            FeatureSummary::Continuous { std, .. } => Some(*std),
            FeatureSummary::Categorical { .. } => None,
        }
    }
}
