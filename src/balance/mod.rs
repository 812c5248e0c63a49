//! Data balance analysis
//!
//! Checks a dataset for skewed features, label imbalance, outcome disparities
//! across sensitive groups (singly and for the first pair of attributes) and
//! basic data quality problems.

mod quality;

pub use quality::{ColumnQuality, DataQualityReport, DataQualityScorer, QualityWarning};

use crate::data::{Column, Dataset};
use crate::error::{DiagnosticsError, Result};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Data balance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataBalanceConfig {
    /// Used when `analyze` gets no label column
    pub label_column: Option<String>,
    /// Used when `analyze` gets no sensitive features
    pub sensitive_features: Vec<String>,
    /// Numeric columns with fewer distinct values are categorical
    pub unique_threshold: usize,
    /// Features above this imbalance score are reported as imbalanced
    pub imbalance_threshold: f64,
    /// Majority/minority ratio above which a feature or label is called extreme
    pub extreme_ratio: f64,
    pub skew_threshold: f64,
    /// Outlier share above which outliers are reported
    pub outlier_fraction: f64,
    /// Labels are balanced when majority/minority is at most this
    pub label_balance_ratio: f64,
    pub disparate_impact_threshold: f64,
    pub intersectional_threshold: f64,
    pub quality_threshold: f64,
}

impl Default for DataBalanceConfig {
    fn default() -> Self {
        Self {
            label_column: None,
            sensitive_features: Vec::new(),
            unique_threshold: 10,
            imbalance_threshold: 0.5,
            extreme_ratio: 10.0,
            skew_threshold: 1.0,
            outlier_fraction: 0.05,
            label_balance_ratio: 3.0,
            disparate_impact_threshold: 0.8,
            intersectional_threshold: 0.2,
            quality_threshold: 0.8,
        }
    }
}

impl DataBalanceConfig {
    pub fn with_label_column(mut self, label: impl Into<String>) -> Self {
        self.label_column = Some(label.into());
        self
    }

    pub fn with_sensitive_features<S: Into<String>>(mut self, features: Vec<S>) -> Self {
        self.sensitive_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: String, reason: &str| DiagnosticsError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };
        if self.unique_threshold == 0 {
            return Err(invalid("unique_threshold", "0".into(), "must be at least 1"));
        }
        for (name, value) in [
            ("imbalance_threshold", self.imbalance_threshold),
            ("outlier_fraction", self.outlier_fraction),
            ("disparate_impact_threshold", self.disparate_impact_threshold),
            ("intersectional_threshold", self.intersectional_threshold),
            ("quality_threshold", self.quality_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, value.to_string(), "must be in [0, 1]"));
            }
        }
        if !(self.label_balance_ratio >= 1.0) {
            return Err(invalid(
                "label_balance_ratio",
                self.label_balance_ratio.to_string(),
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub num_samples: usize,
    pub num_features: usize,
    pub feature_names: Vec<String>,
    /// Approximate in-memory size of the cells
    pub memory_usage_bytes: usize,
    /// Columns with at least one missing value
    pub missing_values: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub value: String,
    pub count: usize,
    /// Share of non-missing values, in percent
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousSummary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    /// Values outside the 1.5 IQR fences
    pub outlier_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureDistribution {
    Categorical {
        /// Most frequent first, ties by value
        values: Vec<CategoryShare>,
        majority_class: Option<String>,
        minority_class: Option<String>,
        imbalance_ratio: f64,
    },
    /// `None` when the column has no values
    Continuous(Option<ContinuousSummary>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBalance {
    pub feature_name: String,
    pub distribution: FeatureDistribution,
    /// 0 = balanced, 1 = maximally imbalanced
    pub imbalance_score: f64,
    pub recommendations: Vec<String>,
}

impl FeatureBalance {
    pub fn is_categorical(&self) -> bool {
        matches!(self.distribution, FeatureDistribution::Categorical { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelBalance {
    pub label_name: String,
    /// Most frequent first, ties by value
    pub class_distribution: Vec<CategoryShare>,
    pub imbalance_ratio: f64,
    pub is_balanced: bool,
    pub majority_class: String,
    pub minority_class: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitiveAttributeBalance {
    pub attribute_name: String,
    pub group_distribution: Vec<(String, usize)>,
    /// Share of each group carrying the positive (most frequent) label
    pub positive_outcome_rates: Vec<(String, f64)>,
    /// `None` when the attribute has no groups
    pub statistical_parity_difference: Option<f64>,
    pub disparate_impact_ratio: Option<f64>,
    pub is_fair: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionalGroup {
    pub group: String,
    pub count: usize,
    pub percentage: f64,
    pub positive_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionalAnalysis {
    pub attributes: (String, String),
    pub groups: Vec<IntersectionalGroup>,
    pub max_disparity: Option<f64>,
    pub is_intersectionally_fair: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelStatus {
    Balanced,
    Imbalanced,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FairnessStatus {
    Fair,
    Unfair,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub total_features_analyzed: usize,
    pub imbalanced_features: Vec<String>,
    pub label_status: LabelStatus,
    pub fairness_status: FairnessStatus,
    pub data_quality_score: f64,
    pub key_findings: Vec<String>,
    pub priority_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub dataset_info: DatasetInfo,
    /// Most imbalanced first
    pub feature_balance: Vec<FeatureBalance>,
    pub label_balance: Option<LabelBalance>,
    pub sensitive_attribute_balance: Option<Vec<SensitiveAttributeBalance>>,
    pub intersectional_analysis: Option<IntersectionalAnalysis>,
    pub data_quality: DataQualityReport,
    pub summary: BalanceSummary,
    /// Sections skipped and why
    pub notes: Vec<String>,
}

impl BalanceReport {
    pub fn feature(&self, name: &str) -> Option<&FeatureBalance> {
        self.feature_balance.iter().find(|f| f.feature_name == name)
    }
}

/// Dataset balance analyzer
#[derive(Debug, Clone, Default)]
pub struct DataBalanceAnalyzer {
    config: DataBalanceConfig,
}

impl DataBalanceAnalyzer {
    pub fn new(config: DataBalanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataBalanceConfig {
        &self.config
    }

    /// Analyze `data`. Unset arguments fall back to the configured label
    /// column and sensitive features; categorical columns are detected when
    /// `categorical_features` is `None`.
    pub fn analyze(
        &self,
        data: &Dataset,
        label_column: Option<&str>,
        sensitive_features: Option<&[String]>,
        categorical_features: Option<&[String]>,
    ) -> Result<BalanceReport> {
        self.config.validate()?;

        let label = label_column.or(self.config.label_column.as_deref());
        let sensitive: &[String] = sensitive_features.unwrap_or(&self.config.sensitive_features);

        if let Some(label) = label {
            data.require(label)?;
        }
        for name in sensitive.iter().chain(categorical_features.unwrap_or(&[])) {
            data.require(name)?;
        }

        info!(
            samples = data.n_rows(),
            features = data.n_cols(),
            label = label.unwrap_or("-"),
            sensitive = sensitive.len(),
            "Starting data balance analysis"
        );

        let categorical: BTreeSet<&str> = match categorical_features {
            Some(names) => data
                .columns()
                .filter(|(name, column)| column.is_categorical() || names.iter().any(|n| n.as_str() == *name))
                .map(|(name, _)| name)
                .collect(),
            None => self.detect_categorical(data),
        };

        let mut notes = Vec::new();
        let feature_balance = self.feature_balance(data, &categorical);

        let label_balance = match label {
            Some(label) => {
                let balance = self.label_balance(data, label)?;
                if balance.is_none() {
                    notes.push(format!("label column '{}' has no values", label));
                }
                balance
            }
            None => {
                notes.push("no label column given, label balance skipped".to_string());
                None
            }
        };

        let positive = label.and_then(|l| positive_class(data.column(l)?));
        let (sensitive_attribute_balance, intersectional_analysis) = match (label, &positive) {
            (Some(label), Some(positive)) if !sensitive.is_empty() => {
                let label_column = data.require(label)?;
                let balances = sensitive
                    .iter()
                    .map(|attr| -> Result<SensitiveAttributeBalance> {
                        Ok(self.sensitive_balance(attr, data.require(attr)?, label_column, positive))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let intersectional = if sensitive.len() >= 2 {
                    Some(self.intersectional(data, &sensitive[0], &sensitive[1], label_column, positive)?)
                } else {
                    notes.push("fewer than two sensitive features, intersectional analysis skipped".to_string());
                    None
                };
                (Some(balances), intersectional)
            }
            _ => {
                notes.push("no sensitive features or usable label, fairness analysis skipped".to_string());
                (None, None)
            }
        };

        let data_quality = DataQualityScorer::score(data);

        let summary = self.summary(
            &feature_balance,
            label_balance.as_ref(),
            sensitive_attribute_balance.as_deref(),
            &data_quality,
        );

        info!(
            imbalanced_features = summary.imbalanced_features.len(),
            quality = data_quality.overall_score,
            "Data balance analysis complete"
        );

        Ok(BalanceReport {
            dataset_info: dataset_info(data),
            feature_balance,
            label_balance,
            sensitive_attribute_balance,
            intersectional_analysis,
            data_quality,
            summary,
            notes,
        })
    }

    /// String columns, and numeric columns with few distinct values
    pub fn detect_categorical<'a>(&self, data: &'a Dataset) -> BTreeSet<&'a str> {
        data.columns()
            .filter(|(_, column)| column.is_categorical() || column.n_unique() < self.config.unique_threshold)
            .map(|(name, _)| name)
            .collect()
    }

    fn feature_balance(&self, data: &Dataset, categorical: &BTreeSet<&str>) -> Vec<FeatureBalance> {
        let mut balances: Vec<FeatureBalance> = data
            .columns()
            .map(|(name, column)| {
                if categorical.contains(name) {
                    self.categorical_balance(name, column)
                } else {
                    self.continuous_balance(name, column)
                }
            })
            .collect();
        balances.sort_by(|a, b| {
            b.imbalance_score
                .partial_cmp(&a.imbalance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        balances
    }

    fn categorical_balance(&self, name: &str, column: &Column) -> FeatureBalance {
        let values = shares(column);
        let counts: Vec<usize> = values.iter().map(|s| s.count).collect();
        let imbalance_score = stats::entropy_imbalance(&counts);
        let imbalance_ratio = match (values.first(), values.last()) {
            (Some(top), Some(bottom)) if values.len() > 1 => top.count as f64 / bottom.count as f64,
            _ => 1.0,
        };

        let mut recommendations = Vec::new();
        if imbalance_score > self.config.imbalance_threshold {
            recommendations.push(format!(
                "'{}' is strongly imbalanced; consider over- or under-sampling",
                name
            ));
        }
        if imbalance_ratio > self.config.extreme_ratio {
            recommendations.push(format!(
                "Majority to minority ratio in '{}' is {:.1}:1",
                name, imbalance_ratio
            ));
        }

        FeatureBalance {
            feature_name: name.to_string(),
            distribution: FeatureDistribution::Categorical {
                majority_class: values.first().map(|s| s.value.clone()),
                minority_class: values.last().map(|s| s.value.clone()),
                values,
                imbalance_ratio,
            },
            imbalance_score,
            recommendations,
        }
    }

    fn continuous_balance(&self, name: &str, column: &Column) -> FeatureBalance {
        let values = column.numeric_values();
        let summary = continuous_summary(&values);

        let mut recommendations = Vec::new();
        let mut imbalance_score = 0.0;
        if let Some(summary) = &summary {
            let skew = summary.skewness.map_or(0.0, f64::abs);
            imbalance_score = (skew / 2.0).min(1.0);
            if skew > self.config.skew_threshold {
                recommendations.push(format!(
                    "'{}' is skewed (skewness {:.2}); consider a log transform",
                    name, skew
                ));
            }
            if summary.outlier_count as f64 > values.len() as f64 * self.config.outlier_fraction {
                recommendations.push(format!(
                    "'{}' has {} outliers ({:.1}%)",
                    name,
                    summary.outlier_count,
                    summary.outlier_count as f64 / values.len() as f64 * 100.0
                ));
            }
        }

        FeatureBalance {
            feature_name: name.to_string(),
            distribution: FeatureDistribution::Continuous(summary),
            imbalance_score,
            recommendations,
        }
    }

    fn label_balance(&self, data: &Dataset, label: &str) -> Result<Option<LabelBalance>> {
        let class_distribution = shares(data.require(label)?);
        let (Some(top), Some(bottom)) = (class_distribution.first(), class_distribution.last()) else {
            return Ok(None);
        };
        let imbalance_ratio = top.count as f64 / bottom.count as f64;
        let is_balanced = imbalance_ratio <= self.config.label_balance_ratio;

        let mut recommendations = Vec::new();
        if !is_balanced {
            recommendations.push(format!("Label imbalance ratio is {:.1}:1", imbalance_ratio));
            if imbalance_ratio > self.config.extreme_ratio {
                recommendations.push("Consider oversampling techniques such as SMOTE or ADASYN".to_string());
            } else {
                recommendations.push("Consider class weights or stratified sampling".to_string());
            }
        }

        Ok(Some(LabelBalance {
            label_name: label.to_string(),
            majority_class: top.value.clone(),
            minority_class: bottom.value.clone(),
            class_distribution,
            imbalance_ratio,
            is_balanced,
            recommendations,
        }))
    }

    fn sensitive_balance(
        &self,
        attribute: &str,
        column: &Column,
        label: &Column,
        positive: &str,
    ) -> SensitiveAttributeBalance {
        let group_distribution: Vec<(String, usize)> =
            shares(column).into_iter().map(|s| (s.value, s.count)).collect();

        let groups = group_rows(column.len(), |row| column.key(row));
        let positive_outcome_rates: Vec<(String, f64)> = groups
            .into_iter()
            .map(|(group, rows)| (group, positive_rate(label, &rows, positive)))
            .collect();

        let (spd, di) = disparity(&positive_outcome_rates);
        let is_fair = di.map_or(true, |d| d >= self.config.disparate_impact_threshold);

        let mut recommendations = Vec::new();
        if let (false, Some(d)) = (is_fair, di) {
            recommendations.push(format!("Outcome rates differ across '{}' groups", attribute));
            recommendations.push(format!(
                "Disparate impact ratio: {:.2} (recommended: >= {:.2})",
                d, self.config.disparate_impact_threshold
            ));
            recommendations.push("Consider fairness constraints or rebalancing the data".to_string());
        }
        debug!(attribute, disparate_impact = ?di, "Sensitive attribute analyzed");

        SensitiveAttributeBalance {
            attribute_name: attribute.to_string(),
            group_distribution,
            positive_outcome_rates,
            statistical_parity_difference: spd,
            disparate_impact_ratio: di,
            is_fair,
            recommendations,
        }
    }

    fn intersectional(
        &self,
        data: &Dataset,
        first: &str,
        second: &str,
        label: &Column,
        positive: &str,
    ) -> Result<IntersectionalAnalysis> {
        let a = data.require(first)?;
        let b = data.require(second)?;
        let n = data.n_rows();

        let groups: Vec<IntersectionalGroup> = group_rows(n, |row| Some(format!("{}_{}", a.key(row)?, b.key(row)?)))
            .into_iter()
            .map(|(group, rows)| IntersectionalGroup {
                percentage: if n > 0 { rows.len() as f64 / n as f64 * 100.0 } else { 0.0 },
                positive_rate: positive_rate(label, &rows, positive),
                count: rows.len(),
                group,
            })
            .collect();

        let rates: Vec<(String, f64)> = groups.iter().map(|g| (g.group.clone(), g.positive_rate)).collect();
        let (max_disparity, _) = disparity(&rates);
        let is_intersectionally_fair = max_disparity.map_or(true, |d| d < self.config.intersectional_threshold);
        let recommendations = match max_disparity {
            Some(d) if !is_intersectionally_fair => {
                vec![format!("Largest outcome gap between intersectional groups: {:.1}%", d * 100.0)]
            }
            _ => Vec::new(),
        };

        Ok(IntersectionalAnalysis {
            attributes: (first.to_string(), second.to_string()),
            groups,
            max_disparity,
            is_intersectionally_fair,
            recommendations,
        })
    }

    fn summary(
        &self,
        features: &[FeatureBalance],
        label: Option<&LabelBalance>,
        sensitive: Option<&[SensitiveAttributeBalance]>,
        quality: &DataQualityReport,
    ) -> BalanceSummary {
        let mut key_findings = Vec::new();
        let mut priority_actions = Vec::new();

        let imbalanced_features: Vec<String> = features
            .iter()
            .filter(|f| f.imbalance_score > self.config.imbalance_threshold)
            .map(|f| f.feature_name.clone())
            .collect();

        let label_status = match label {
            Some(l) if l.is_balanced => LabelStatus::Balanced,
            Some(l) => {
                key_findings.push(format!("Label imbalance detected: {:.1}:1", l.imbalance_ratio));
                priority_actions.push("Rebalance the label distribution".to_string());
                LabelStatus::Imbalanced
            }
            None => LabelStatus::Unknown,
        };

        let fairness_status = match sensitive {
            Some(balances) if !balances.is_empty() => {
                let unfair: Vec<&str> = balances
                    .iter()
                    .filter(|b| !b.is_fair)
                    .map(|b| b.attribute_name.as_str())
                    .collect();
                if unfair.is_empty() {
                    FairnessStatus::Fair
                } else {
                    key_findings.push(format!("Fairness issues detected: {}", unfair.join(", ")));
                    priority_actions.push("Apply fairness mitigation".to_string());
                    FairnessStatus::Unfair
                }
            }
            _ => FairnessStatus::Unknown,
        };

        if quality.overall_score < self.config.quality_threshold {
            key_findings.push(format!("Low data quality score: {:.2}", quality.overall_score));
            priority_actions.push("Clean and preprocess the data".to_string());
        }

        BalanceSummary {
            total_features_analyzed: features.len(),
            imbalanced_features,
            label_status,
            fairness_status,
            data_quality_score: quality.overall_score,
            key_findings,
            priority_actions,
        }
    }
}

/// Value counts, most frequent first, ties by value
fn shares(column: &Column) -> Vec<CategoryShare> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..column.len() {
        if let Some(key) = column.key(row) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    let total: usize = counts.values().sum();
    let mut shares: Vec<CategoryShare> = counts
        .into_iter()
        .map(|(value, count)| CategoryShare {
            value,
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    shares
}

/// Most frequent label value
fn positive_class(label: &Column) -> Option<String> {
    shares(label).into_iter().next().map(|s| s.value)
}

/// Row indices per key, keys sorted; rows without a key are dropped
fn group_rows<F>(n: usize, key: F) -> BTreeMap<String, Vec<usize>>
where
    F: Fn(usize) -> Option<String>,
{
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for row in 0..n {
        if let Some(k) = key(row) {
            groups.entry(k).or_default().push(row);
        }
    }
    groups
}

fn positive_rate(label: &Column, rows: &[usize], positive: &str) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let hits = rows
        .iter()
        .filter(|&&row| label.key(row).as_deref() == Some(positive))
        .count();
    hits as f64 / rows.len() as f64
}

/// `(max - min, min / max)` over group rates; the ratio is 1 when every rate is 0
fn disparity(rates: &[(String, f64)]) -> (Option<f64>, Option<f64>) {
    if rates.is_empty() {
        return (None, None);
    }
    let max = rates.iter().map(|(_, r)| *r).fold(f64::NEG_INFINITY, f64::max);
    let min = rates.iter().map(|(_, r)| *r).fold(f64::INFINITY, f64::min);
    let ratio = if max > 0.0 { min / max } else { 1.0 };
    (Some(max - min), Some(ratio))
}

fn dataset_info(data: &Dataset) -> DatasetInfo {
    let memory_usage_bytes = data
        .columns()
        .map(|(_, column)| match column {
            Column::Continuous(v) => v.len() * std::mem::size_of::<Option<f64>>(),
            Column::Categorical(v) => v
                .iter()
                .map(|s| std::mem::size_of::<Option<String>>() + s.as_ref().map_or(0, String::len))
                .sum(),
        })
        .sum();
    DatasetInfo {
        num_samples: data.n_rows(),
        num_features: data.n_cols(),
        feature_names: data.column_names().to_vec(),
        memory_usage_bytes,
        missing_values: data
            .columns()
            .map(|(name, column)| (name.to_string(), column.missing_count()))
            .filter(|(_, missing)| *missing > 0)
            .collect(),
    }
}

fn continuous_summary(values: &[f64]) -> Option<ContinuousSummary> {
    let mean = stats::mean(values)?;
    let quartiles = stats::percentiles(values, &[25.0, 75.0])?;
    let (q1, q3) = (quartiles[0], quartiles[1]);
    let iqr = q3 - q1;
    let (low, high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    Some(ContinuousSummary {
        mean,
        std: stats::std_dev(values, 1).unwrap_or(0.0),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        median: stats::median(values).unwrap_or(mean),
        q1,
        q3,
        skewness: stats::skewness(values),
        kurtosis: stats::kurtosis(values),
        outlier_count: values.iter().filter(|&&v| v < low || v > high).count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(majority: usize, minority: usize) -> Vec<&'static str> {
        let mut out = vec!["no"; majority];
        out.extend(vec!["yes"; minority]);
        out
    }

    #[test]
    fn test_label_ratio_and_threshold() {
        let data = Dataset::new()
            .with_categorical("y", labels(950, 50))
            .unwrap();
        let report = DataBalanceAnalyzer::default().analyze(&data, Some("y"), None, None).unwrap();
        let label = report.label_balance.unwrap();
        assert_eq!(label.imbalance_ratio, 19.0);
        assert!(!label.is_balanced);
        assert_eq!(label.majority_class, "no");
        assert_eq!(report.summary.label_status, LabelStatus::Imbalanced);
    }

    #[test]
    fn test_ratio_of_three_is_balanced() {
        let data = Dataset::new()
            .with_categorical("y", labels(30, 10))
            .unwrap();
        let report = DataBalanceAnalyzer::default().analyze(&data, Some("y"), None, None).unwrap();
        assert!(report.label_balance.unwrap().is_balanced);
    }

    #[test]
    fn test_disparate_impact() {
        // group a: 8/10 positive ("no" is the most frequent label), group b: 4/10
        let y: Vec<&str> = (0..20)
            .map(|i| match (i < 10, i % 10) {
                (true, k) if k < 8 => "no",
                (false, k) if k < 4 => "no",
                _ => "yes",
            })
            .collect();
        let g: Vec<&str> = (0..20).map(|i| if i < 10 { "a" } else { "b" }).collect();
        let data = Dataset::new()
            .with_categorical("y", y)
            .unwrap()
            .with_categorical("g", g)
            .unwrap();
        let sensitive = vec!["g".to_string()];
        let report = DataBalanceAnalyzer::default()
            .analyze(&data, Some("y"), Some(&sensitive), None)
            .unwrap();
        let balance = &report.sensitive_attribute_balance.unwrap()[0];
        assert!((balance.disparate_impact_ratio.unwrap() - 0.5).abs() < 1e-12);
        assert!((balance.statistical_parity_difference.unwrap() - 0.4).abs() < 1e-12);
        assert!(!balance.is_fair);
        assert_eq!(report.summary.fairness_status, FairnessStatus::Unfair);
        assert!(report.intersectional_analysis.is_none());
    }

    #[test]
    fn test_disparate_impact_at_threshold_is_fair() {
        // group a: 8/10 "yes", group b: 10/10, ratio exactly 0.8
        let analyze = |a_positives: usize| {
            let y: Vec<&str> = (0..20)
                .map(|i| if i >= 10 || i < a_positives { "yes" } else { "no" })
                .collect();
            let g: Vec<&str> = (0..20).map(|i| if i < 10 { "a" } else { "b" }).collect();
            let data = Dataset::new()
                .with_categorical("y", y)
                .unwrap()
                .with_categorical("g", g)
                .unwrap();
            let sensitive = vec!["g".to_string()];
            let report = DataBalanceAnalyzer::default()
                .analyze(&data, Some("y"), Some(&sensitive), None)
                .unwrap();
            report.sensitive_attribute_balance.unwrap().remove(0)
        };

        let at_threshold = analyze(8);
        assert_eq!(at_threshold.disparate_impact_ratio, Some(0.8));
        assert!(at_threshold.is_fair);

        let below = analyze(7);
        assert!(below.disparate_impact_ratio.unwrap() < 0.8);
        assert!(!below.is_fair);
    }

    /// Ten rows per `(a, b, positives)` cell; the rest alternate between "no" and "maybe"
    fn cells(spec: &[(&'static str, &'static str, usize)]) -> Dataset {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut y = Vec::new();
        for &(first, second, positives) in spec {
            for k in 0..10 {
                a.push(first);
                b.push(second);
                y.push(match k {
                    k if k < positives => "yes",
                    k if (k - positives) % 2 == 0 => "no",
                    _ => "maybe",
                });
            }
        }
        Dataset::new()
            .with_categorical("y", y)
            .unwrap()
            .with_categorical("a", a)
            .unwrap()
            .with_categorical("b", b)
            .unwrap()
    }

    #[test]
    fn test_intersectional_gap_at_threshold_is_unfair() {
        let sensitive = vec!["a".to_string(), "b".to_string()];
        let analyze = |data: Dataset| {
            DataBalanceAnalyzer::default()
                .analyze(&data, Some("y"), Some(&sensitive), None)
                .unwrap()
                .intersectional_analysis
                .unwrap()
        };

        // "yes" is the most frequent of three labels; rates 0.4 and 0.2 differ by exactly 0.2
        let at_threshold = analyze(cells(&[("p", "u", 4), ("p", "v", 4), ("q", "u", 2), ("q", "v", 4)]));
        assert_eq!(at_threshold.groups.len(), 4);
        assert_eq!(at_threshold.max_disparity, Some(0.2));
        assert!(!at_threshold.is_intersectionally_fair);
        assert_eq!(at_threshold.recommendations.len(), 1);

        let below = analyze(cells(&[("p", "u", 4), ("p", "v", 4), ("q", "u", 3), ("q", "v", 4)]));
        assert!(below.max_disparity.unwrap() < 0.2);
        assert!(below.is_intersectionally_fair);
        assert!(below.recommendations.is_empty());
    }

    #[test]
    fn test_close_numeric_labels_stay_distinct() {
        let mut y = vec![0.10001; 30];
        y.extend(vec![0.10002; 10]);
        let data = Dataset::new().with_continuous("y", y).unwrap();
        let report = DataBalanceAnalyzer::default().analyze(&data, Some("y"), None, None).unwrap();
        let label = report.label_balance.unwrap();
        assert_eq!(label.class_distribution.len(), 2);
        assert_eq!(label.imbalance_ratio, 3.0);
        assert_eq!(label.majority_class, "0.10001");
        assert_eq!(label.minority_class, "0.10002");
    }

    #[test]
    fn test_missing_label_column_is_error() {
        let data = Dataset::new().with_continuous("x", vec![1.0, 2.0]).unwrap();
        let result = DataBalanceAnalyzer::default().analyze(&data, Some("label"), None, None);
        assert!(matches!(result, Err(DiagnosticsError::FeatureNotFound(_))));
    }

    #[test]
    fn test_skipped_sections_are_noted() {
        let data = Dataset::new().with_continuous("x", vec![1.0, 2.0, 3.0]).unwrap();
        let report = DataBalanceAnalyzer::default().analyze(&data, None, None, None).unwrap();
        assert!(report.label_balance.is_none());
        assert!(report.sensitive_attribute_balance.is_none());
        assert_eq!(report.summary.label_status, LabelStatus::Unknown);
        assert_eq!(report.summary.fairness_status, FairnessStatus::Unknown);
        assert_eq!(report.notes.len(), 2);
    }

    #[test]
    fn test_low_cardinality_numeric_is_categorical() {
        let x: Vec<f64> = (0..50).map(|i| (i % 3) as f64).collect();
        let z: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let data = Dataset::new()
            .with_continuous("x", x)
            .unwrap()
            .with_continuous("z", z)
            .unwrap();
        let report = DataBalanceAnalyzer::default().analyze(&data, None, None, None).unwrap();
        assert!(report.feature("x").unwrap().is_categorical());
        assert!(!report.feature("z").unwrap().is_categorical());
    }

    #[test]
    fn test_features_sorted_by_imbalance() {
        let skewed: Vec<f64> = (0..40).map(|i| if i < 36 { 0.0 } else { 1.0 }).collect();
        let even: Vec<f64> = (0..40).map(|i| (i % 2) as f64).collect();
        let data = Dataset::new()
            .with_continuous("even", even)
            .unwrap()
            .with_continuous("skewed", skewed)
            .unwrap();
        let report = DataBalanceAnalyzer::default().analyze(&data, None, None, None).unwrap();
        assert_eq!(report.feature_balance[0].feature_name, "skewed");
        assert!(report.feature_balance[1].imbalance_score < 1e-12);
        assert_eq!(report.summary.imbalanced_features, vec!["skewed".to_string()]);
    }
}
