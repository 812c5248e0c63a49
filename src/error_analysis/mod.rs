//! Error analysis
//!
//! Locates where a model fails. Given features, labels and predictions the
//! analyzer derives a per-sample error indicator and then:
//!
//! - grows a shallow decision tree predicting the indicator,
//! - mines single-feature cohorts whose error rate is well above average,
//! - breaks error rates down per value or per quartile bin,
//! - ranks features by how well a random forest predicts errors from them,
//! - builds pairwise quantile heatmaps over the most important features.
//!
//! Tree or forest fitting failures fall back to simpler methods; the method
//! that actually ran is recorded in the report.

mod report;

pub use report::{
    BinErrorRate, Cohort, CohortPredicate, ErrorReport, ErrorSummary, ErrorTreeNode,
    FeatureErrorBreakdown, HeatmapCell, HeatmapGrid, HeatmapReport, ImportanceMethod, TreeMethod,
    ValueErrorRate, WorstCohort,
};

use crate::data::{Column, Dataset, FeatureValue};
use crate::error::{DiagnosticsError, Result};
use crate::estimators::{DecisionTree, RandomForest, TreeNode};
use crate::stats;
use ndarray::{Array1, Array2};
use report::rate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Labels closer than this count as equal
const ERROR_TOLERANCE: f64 = 1e-10;

/// Error analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorAnalysisConfig {
    /// Error tree depth limit
    pub max_depth: usize,
    /// Minimum samples per tree leaf and per cohort
    pub min_samples_leaf: usize,
    /// Error tree leaf budget
    pub max_leaf_nodes: usize,
    /// A cohort is kept when its error rate exceeds this multiple of the overall rate
    pub cohort_error_multiplier: f64,
    pub max_cohorts: usize,
    pub importance_trees: usize,
    pub importance_max_depth: usize,
    /// Features taken (by importance) into the heatmap
    pub heatmap_features: usize,
    pub heatmap_bins: usize,
    /// Overall error rate above which retraining is recommended
    pub retrain_threshold: f64,
    /// Cohorts above this multiple of the overall rate get their own recommendation
    pub investigate_multiplier: f64,
    pub random_state: Option<u64>,
}

impl Default for ErrorAnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            min_samples_leaf: 20,
            max_leaf_nodes: 31,
            cohort_error_multiplier: 1.2,
            max_cohorts: 10,
            importance_trees: 50,
            importance_max_depth: 5,
            heatmap_features: 5,
            heatmap_bins: 5,
            retrain_threshold: 0.1,
            investigate_multiplier: 2.0,
            random_state: Some(42),
        }
    }
}

impl ErrorAnalysisConfig {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_leaf_nodes(mut self, leaves: usize) -> Self {
        self.max_leaf_nodes = leaves;
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
        if self.max_depth == 0 {
            return Err(invalid("max_depth", "0".into(), "must be at least 1"));
        }
        if self.min_samples_leaf == 0 {
            return Err(invalid("min_samples_leaf", "0".into(), "must be at least 1"));
        }
        if self.max_leaf_nodes < 2 {
            return Err(invalid("max_leaf_nodes", self.max_leaf_nodes.to_string(), "must be at least 2"));
        }
        if !(self.cohort_error_multiplier >= 1.0) {
            return Err(invalid(
                "cohort_error_multiplier",
                self.cohort_error_multiplier.to_string(),
                "must be at least 1",
            ));
        }
        if self.importance_trees == 0 {
            return Err(invalid("importance_trees", "0".into(), "must be at least 1"));
        }
        if self.heatmap_bins < 2 {
            return Err(invalid("heatmap_bins", self.heatmap_bins.to_string(), "must be at least 2"));
        }
        Ok(())
    }
}

/// Encoded view of the analyzed features
struct FeatureFrame<'a> {
    names: Vec<String>,
    columns: Vec<&'a Column>,
    categorical: Vec<bool>,
    matrix: Array2<f64>,
}

/// Tree-guided error analyzer
#[derive(Debug, Clone, Default)]
pub struct ErrorAnalyzer {
    config: ErrorAnalysisConfig,
}

impl ErrorAnalyzer {
    pub fn new(config: ErrorAnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ErrorAnalysisConfig {
        &self.config
    }

    /// Analyze where `y_pred` disagrees with `y_true`.
    ///
    /// `feature_names` restricts the analysis to a subset of columns (default:
    /// all). Columns holding strings are always categorical; numeric columns
    /// become categorical when listed in `categorical_features`.
    pub fn analyze(
        &self,
        x: &Dataset,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        feature_names: Option<&[String]>,
        categorical_features: Option<&[String]>,
    ) -> Result<ErrorReport> {
        let n = x.n_rows();
        if y_true.len() != n {
            return Err(DiagnosticsError::length_mismatch("y_true", n, y_true.len()));
        }
        if y_pred.len() != n {
            return Err(DiagnosticsError::length_mismatch("y_pred", n, y_pred.len()));
        }
        if n == 0 {
            return Err(DiagnosticsError::DataError("error analysis needs at least one sample".to_string()));
        }

        let frame = self.frame(x, feature_names, categorical_features.unwrap_or(&[]))?;
        info!(samples = n, features = frame.names.len(), "Starting error analysis");

        let errors: Vec<bool> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).abs() > ERROR_TOLERANCE)
            .collect();
        let total_errors = errors.iter().filter(|&&e| e).count();
        let overall_error_rate = rate(total_errors, n);

        let (error_tree, tree_method, tree_fallback_reason) = self.build_error_tree(&frame, &errors);
        let cohorts = self.identify_cohorts(&frame, &errors, overall_error_rate);
        let feature_errors = self.feature_breakdown(&frame, &errors);
        let (feature_importances, importance_method, importance_fallback_reason) =
            self.feature_importances(&frame, &errors);
        let heatmap = self.heatmap(&frame, &errors, &feature_importances);

        let summary = self.summarize(n, total_errors, overall_error_rate, &cohorts, &feature_importances);

        info!(
            error_rate = overall_error_rate,
            cohorts = cohorts.len(),
            tree_leaves = error_tree.n_leaves(),
            "Error analysis complete"
        );

        Ok(ErrorReport {
            overall_error_rate,
            total_samples: n,
            total_errors,
            error_tree,
            tree_method,
            tree_fallback_reason,
            cohorts,
            feature_errors,
            feature_importances,
            importance_method,
            importance_fallback_reason,
            heatmap,
            summary,
        })
    }

    fn frame<'a>(
        &self,
        x: &'a Dataset,
        feature_names: Option<&[String]>,
        categorical_features: &[String],
    ) -> Result<FeatureFrame<'a>> {
        let names: Vec<String> = match feature_names {
            Some(names) => names.to_vec(),
            None => x.column_names().to_vec(),
        };
        for name in names.iter().chain(categorical_features) {
            x.require(name)?;
        }

        let mut columns = Vec::with_capacity(names.len());
        let mut categorical = Vec::with_capacity(names.len());
        for name in &names {
            let column = x.require(name)?;
            categorical.push(column.is_categorical() || categorical_features.contains(name));
            columns.push(column);
        }
        let matrix = x.select_columns(&names)?.to_matrix();

        Ok(FeatureFrame {
            names,
            columns,
            categorical,
            matrix,
        })
    }

    fn build_error_tree(&self, frame: &FeatureFrame<'_>, errors: &[bool]) -> (ErrorTreeNode, TreeMethod, Option<String>) {
        let all: Vec<usize> = (0..errors.len()).collect();
        let root_only = || ErrorTreeNode::leaf(errors.len(), errors.iter().filter(|&&e| e).count(), 0);

        let target: Array1<f64> = errors.iter().map(|&e| if e { 1.0 } else { 0.0 }).collect();
        let mut tree = DecisionTree::new_classifier()
            .with_max_depth(self.config.max_depth)
            .with_min_samples_leaf(self.config.min_samples_leaf)
            .with_max_leaf_nodes(self.config.max_leaf_nodes)
            .with_random_state(self.config.random_state.unwrap_or(0));

        match tree.fit(&frame.matrix, &target) {
            Ok(_) => match tree.root() {
                Some(root) => (self.convert_node(root, frame, errors, &all, 0), TreeMethod::DecisionTree, None),
                None => (root_only(), TreeMethod::RootOnly, Some("tree has no root".to_string())),
            },
            Err(e) => {
                warn!(error = %e, "Error tree fitting failed, falling back to a single root leaf");
                (root_only(), TreeMethod::RootOnly, Some(e.to_string()))
            }
        }
    }

    /// Re-route samples through the fitted tree to attach error counts
    fn convert_node(
        &self,
        node: &TreeNode,
        frame: &FeatureFrame<'_>,
        errors: &[bool],
        indices: &[usize],
        depth: usize,
    ) -> ErrorTreeNode {
        let error_count = indices.iter().filter(|&&i| errors[i]).count();
        match node {
            TreeNode::Leaf { .. } => ErrorTreeNode::leaf(indices.len(), error_count, depth),
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                let f = *feature_idx;
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| frame.matrix[[i, f]] <= *threshold);

                let condition = if frame.categorical[f] {
                    let left_values: BTreeSet<String> = left_idx
                        .iter()
                        .filter_map(|&i| frame.columns[f].key(i))
                        .collect();
                    format!("in {{{}}}", left_values.into_iter().collect::<Vec<_>>().join(", "))
                } else {
                    format!("<= {:.3}", threshold)
                };

                ErrorTreeNode {
                    feature: Some(frame.names[f].clone()),
                    threshold: Some(*threshold),
                    condition: Some(condition),
                    error_rate: rate(error_count, indices.len()),
                    sample_count: indices.len(),
                    error_count,
                    depth,
                    is_leaf: false,
                    left: Some(Box::new(self.convert_node(left, frame, errors, &left_idx, depth + 1))),
                    right: Some(Box::new(self.convert_node(right, frame, errors, &right_idx, depth + 1))),
                }
            }
        }
    }

    fn identify_cohorts(&self, frame: &FeatureFrame<'_>, errors: &[bool], overall: f64) -> Vec<Cohort> {
        let n = errors.len();
        let threshold = overall * self.config.cohort_error_multiplier;
        let mut cohorts = Vec::new();

        for (f, name) in frame.names.iter().enumerate() {
            let column = frame.columns[f];
            let predicates: Vec<(String, CohortPredicate)> = if frame.categorical[f] {
                distinct_values(column)
                    .into_iter()
                    .map(|value| {
                        (
                            format!("{} = {}", name, value),
                            CohortPredicate::Equals { feature: name.clone(), value },
                        )
                    })
                    .collect()
            } else {
                let Some(q) = stats::percentiles(&column.numeric_values(), &[0.0, 25.0, 50.0, 75.0, 100.0]) else {
                    continue;
                };
                (0..4)
                    .map(|b| {
                        (
                            format!("{} in [{:.2}, {:.2}]", name, q[b], q[b + 1]),
                            CohortPredicate::Range {
                                feature: name.clone(),
                                min: q[b],
                                max: q[b + 1],
                                max_inclusive: b == 3,
                            },
                        )
                    })
                    .collect()
            };

            for (cohort_name, predicate) in predicates {
                let members: Vec<usize> = (0..n).filter(|&i| predicate.matches(column, i)).collect();
                if members.len() < self.config.min_samples_leaf {
                    continue;
                }
                let error_count = members.iter().filter(|&&i| errors[i]).count();
                let error_rate = rate(error_count, members.len());
                if error_rate > threshold {
                    cohorts.push(Cohort {
                        name: cohort_name,
                        predicate,
                        size: members.len(),
                        error_rate,
                        error_count,
                        coverage: members.len() as f64 / n as f64,
                    });
                }
            }
        }

        cohorts.sort_by(|a, b| {
            b.error_rate
                .partial_cmp(&a.error_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        cohorts.truncate(self.config.max_cohorts);
        debug!(cohorts = cohorts.len(), threshold, "Cohort mining finished");
        cohorts
    }

    fn feature_breakdown(&self, frame: &FeatureFrame<'_>, errors: &[bool]) -> Vec<(String, FeatureErrorBreakdown)> {
        let n = errors.len();
        frame
            .names
            .iter()
            .enumerate()
            .map(|(f, name)| {
                let column = frame.columns[f];
                let breakdown = if frame.categorical[f] {
                    let mut tally: BTreeMap<String, (usize, usize)> = BTreeMap::new();
                    for i in 0..n {
                        if let Some(key) = column.key(i) {
                            let entry = tally.entry(key).or_insert((0, 0));
                            entry.0 += 1;
                            entry.1 += errors[i] as usize;
                        }
                    }
                    let mut values: Vec<ValueErrorRate> = tally
                        .into_iter()
                        .map(|(value, (count, error_count))| ValueErrorRate {
                            value,
                            error_rate: rate(error_count, count),
                            count,
                            error_count,
                        })
                        .collect();
                    values.sort_by(|a, b| b.count.cmp(&a.count));
                    FeatureErrorBreakdown::Categorical { values }
                } else {
                    let present = column.numeric_values();
                    let bins = match stats::percentiles(&present, &[0.0, 25.0, 50.0, 75.0, 100.0]) {
                        Some(q) => (0..4)
                            .filter_map(|b| {
                                let predicate = CohortPredicate::Range {
                                    feature: name.clone(),
                                    min: q[b],
                                    max: q[b + 1],
                                    max_inclusive: b == 3,
                                };
                                let members: Vec<usize> = (0..n).filter(|&i| predicate.matches(column, i)).collect();
                                if members.is_empty() {
                                    return None;
                                }
                                let error_count = members.iter().filter(|&&i| errors[i]).count();
                                Some(BinErrorRate {
                                    range: (q[b], q[b + 1]),
                                    error_rate: rate(error_count, members.len()),
                                    count: members.len(),
                                    error_count,
                                })
                            })
                            .collect(),
                        None => Vec::new(),
                    };
                    FeatureErrorBreakdown::Continuous {
                        bins,
                        mean: stats::mean(&present),
                        std: stats::std_dev(&present, 1),
                    }
                };
                (name.clone(), breakdown)
            })
            .collect()
    }

    fn feature_importances(
        &self,
        frame: &FeatureFrame<'_>,
        errors: &[bool],
    ) -> (Vec<(String, f64)>, ImportanceMethod, Option<String>) {
        let target: Array1<f64> = errors.iter().map(|&e| if e { 1.0 } else { 0.0 }).collect();
        let mut forest = RandomForest::new_classifier(self.config.importance_trees)
            .with_max_depth(self.config.importance_max_depth)
            .with_random_state(self.config.random_state.unwrap_or(0));

        let fitted = forest
            .fit(&frame.matrix, &target)
            .map(|f| f.feature_importances().cloned());

        let (mut importances, method, reason) = match fitted {
            Ok(Some(values)) => (
                frame.names.iter().cloned().zip(values.iter().copied()).collect::<Vec<_>>(),
                ImportanceMethod::Forest,
                None,
            ),
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    _ => "forest produced no importances".to_string(),
                };
                warn!(reason = %reason, "Forest importance failed, falling back to correlation");
                let scores = frame
                    .names
                    .iter()
                    .enumerate()
                    .map(|(f, name)| {
                        let column: Vec<f64> = frame.matrix.column(f).to_vec();
                        let corr = stats::pearson(&column, target.as_slice().unwrap_or(&[])).unwrap_or(0.0);
                        (name.clone(), corr.abs())
                    })
                    .collect();
                (scores, ImportanceMethod::Correlation, Some(reason))
            }
        };

        importances.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        (importances, method, reason)
    }

    fn heatmap(&self, frame: &FeatureFrame<'_>, errors: &[bool], importances: &[(String, f64)]) -> HeatmapReport {
        let top: Vec<usize> = importances
            .iter()
            .take(self.config.heatmap_features)
            .filter_map(|(name, _)| frame.names.iter().position(|n| n == name))
            .collect();

        if top.len() < 2 {
            return HeatmapReport {
                grids: Vec::new(),
                message: Some("not enough features for a heatmap".to_string()),
            };
        }

        let bins: Vec<Vec<Option<usize>>> = top.iter().map(|&f| self.quantile_bins(frame, f)).collect();

        let mut grids = Vec::new();
        for a in 0..top.len() - 1 {
            for b in a + 1..top.len() {
                let mut cells: BTreeMap<(usize, usize), (usize, usize)> = BTreeMap::new();
                for (i, &is_error) in errors.iter().enumerate() {
                    if let (Some(bx), Some(by)) = (bins[a][i], bins[b][i]) {
                        let cell = cells.entry((bx, by)).or_insert((0, 0));
                        cell.0 += 1;
                        cell.1 += is_error as usize;
                    }
                }
                grids.push(HeatmapGrid {
                    feature_x: frame.names[top[a]].clone(),
                    feature_y: frame.names[top[b]].clone(),
                    cells: cells
                        .into_iter()
                        .map(|((x, y), (count, errs))| HeatmapCell {
                            x,
                            y,
                            error_rate: rate(errs, count),
                            count,
                        })
                        .collect(),
                });
            }
        }
        HeatmapReport { grids, message: None }
    }

    /// Quantile bin per row; missing cells get no bin
    fn quantile_bins(&self, frame: &FeatureFrame<'_>, f: usize) -> Vec<Option<usize>> {
        let column = frame.columns[f];
        let values: Vec<Option<f64>> = (0..frame.matrix.nrows())
            .map(|i| (!column.is_missing(i)).then(|| frame.matrix[[i, f]]))
            .collect();
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let edges = stats::quantile_edges(&present, self.config.heatmap_bins);
        values
            .into_iter()
            .map(|v| v.and_then(|v| stats::bin_index(&edges, v)))
            .collect()
    }

    fn summarize(
        &self,
        total_samples: usize,
        total_errors: usize,
        overall: f64,
        cohorts: &[Cohort],
        importances: &[(String, f64)],
    ) -> ErrorSummary {
        let mut recommendations = Vec::new();
        if overall > self.config.retrain_threshold {
            recommendations.push(format!(
                "Overall error rate is {:.1}%, above {:.0}%; consider retraining the model.",
                overall * 100.0,
                self.config.retrain_threshold * 100.0
            ));
        }
        for cohort in cohorts.iter().take(3) {
            if cohort.error_rate > overall * self.config.investigate_multiplier {
                recommendations.push(format!(
                    "Cohort '{}' has a very high error rate ({:.1}%); collect more data for this group or handle it separately.",
                    cohort.name,
                    cohort.error_rate * 100.0
                ));
            }
        }
        if cohorts.is_empty() && overall <= self.config.retrain_threshold {
            recommendations.push("No high-error cohorts found.".to_string());
        }

        ErrorSummary {
            overall_error_rate: overall,
            total_samples,
            total_errors,
            num_cohorts_identified: cohorts.len(),
            top_error_features: importances.iter().take(5).map(|(n, _)| n.clone()).collect(),
            worst_cohort: cohorts.first().map(|c| WorstCohort {
                name: c.name.clone(),
                error_rate: c.error_rate,
                size: c.size,
            }),
            recommendations,
        }
    }
}

/// Distinct non-missing values in sorted order
fn distinct_values(column: &Column) -> Vec<FeatureValue> {
    let mut seen: BTreeMap<String, FeatureValue> = BTreeMap::new();
    for i in 0..column.len() {
        let value = column.value(i);
        if let Some(key) = value.key() {
            seen.entry(key).or_insert(value);
        }
    }
    seen.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 100 rows: `group` A (60 rows, 5 errors) and B (40 rows, 20 errors)
    fn grouped() -> (Dataset, Array1<f64>, Array1<f64>) {
        let group: Vec<&str> = (0..100).map(|i| if i < 60 { "A" } else { "B" }).collect();
        let noise: Vec<f64> = (0..100).map(|i| ((i * 37) % 11) as f64).collect();
        let ds = Dataset::new()
            .with_categorical("group", group)
            .unwrap()
            .with_continuous("noise", noise)
            .unwrap();
        let y_true = Array1::zeros(100);
        let y_pred: Array1<f64> = (0..100)
            .map(|i| {
                let wrong = if i < 60 { i % 12 == 0 } else { i % 2 == 0 };
                if wrong { 1.0 } else { 0.0 }
            })
            .collect();
        (ds, y_true, y_pred)
    }

    #[test]
    fn test_overall_rate_and_counts() {
        let (ds, y_true, y_pred) = grouped();
        let report = ErrorAnalyzer::default().analyze(&ds, &y_true, &y_pred, None, None).unwrap();
        assert_eq!(report.total_errors, 25);
        assert_abs_diff_eq!(report.overall_error_rate, 0.25);
        assert_eq!(report.tree_method, TreeMethod::DecisionTree);
    }

    #[test]
    fn test_high_error_group_is_a_cohort() {
        let (ds, y_true, y_pred) = grouped();
        let report = ErrorAnalyzer::default().analyze(&ds, &y_true, &y_pred, None, None).unwrap();

        let cohort = report.cohort("group = B").expect("group B cohort");
        assert_eq!(cohort.size, 40);
        assert_abs_diff_eq!(cohort.error_rate, 0.5);
        assert_abs_diff_eq!(cohort.coverage, 0.4);
        for c in &report.cohorts {
            assert!(c.error_rate > 1.2 * report.overall_error_rate);
            assert!(c.size >= 20);
        }
    }

    #[test]
    fn test_tree_splits_on_group() {
        let (ds, y_true, y_pred) = grouped();
        let report = ErrorAnalyzer::default().analyze(&ds, &y_true, &y_pred, None, None).unwrap();
        let root = &report.error_tree;
        assert_eq!(root.sample_count, 100);
        assert_eq!(root.error_count, 25);
        assert!(!root.is_leaf);
        let children = [root.left.as_ref().unwrap(), root.right.as_ref().unwrap()];
        assert_eq!(children[0].sample_count + children[1].sample_count, 100);
        assert!(report.error_tree.n_leaves() <= 31);
        assert!(report.error_tree.max_depth() <= 4);
    }

    #[test]
    fn test_shape_mismatch() {
        let (ds, y_true, _) = grouped();
        let err = ErrorAnalyzer::default()
            .analyze(&ds, &y_true, &Array1::zeros(3), None, None)
            .unwrap_err();
        assert!(matches!(err, DiagnosticsError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_unknown_feature() {
        let (ds, y_true, y_pred) = grouped();
        let names = vec!["missing".to_string()];
        let err = ErrorAnalyzer::default()
            .analyze(&ds, &y_true, &y_pred, Some(&names), None)
            .unwrap_err();
        assert!(matches!(err, DiagnosticsError::FeatureNotFound(_)));
    }

    #[test]
    fn test_no_features_falls_back() {
        let (ds, y_true, y_pred) = grouped();
        let report = ErrorAnalyzer::default()
            .analyze(&ds, &y_true, &y_pred, Some(&[]), None)
            .unwrap();
        assert_eq!(report.tree_method, TreeMethod::RootOnly);
        assert!(report.error_tree.is_leaf);
        assert_abs_diff_eq!(report.error_tree.error_rate, 0.25);
        assert!(report.heatmap.grids.is_empty());
        assert!(report.heatmap.message.is_some());
    }

    #[test]
    fn test_heatmap_pairs() {
        let (ds, y_true, y_pred) = grouped();
        let report = ErrorAnalyzer::default().analyze(&ds, &y_true, &y_pred, None, None).unwrap();
        assert_eq!(report.heatmap.grids.len(), 1);
        let total: usize = report.heatmap.grids[0].cells.iter().map(|c| c.count).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_summary_recommendations() {
        let (ds, y_true, y_pred) = grouped();
        let report = ErrorAnalyzer::default().analyze(&ds, &y_true, &y_pred, None, None).unwrap();
        assert_eq!(report.summary.worst_cohort.as_ref().map(|c| c.error_rate), report.cohorts.first().map(|c| c.error_rate));
        assert!(report.summary.recommendations.iter().any(|r| r.contains("retraining")));
    }

    #[test]
    fn test_breakdown_per_value() {
        let (ds, y_true, y_pred) = grouped();
        let report = ErrorAnalyzer::default().analyze(&ds, &y_true, &y_pred, None, None).unwrap();
        let (_, group) = report.feature_errors.iter().find(|(n, _)| n == "group").unwrap();
        match group {
            FeatureErrorBreakdown::Categorical { values } => {
                assert_eq!(values[0].value, "A");
                assert_eq!(values[0].count, 60);
                assert_eq!(values[1].error_count, 20);
            }
            other => panic!("unexpected breakdown {:?}", other),
        }
    }
}
