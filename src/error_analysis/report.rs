//! Report types produced by the error analyzer

use crate::data::{Column, FeatureValue};
use serde::{Deserialize, Serialize};

/// Node of the tree fitted on the error indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTreeNode {
    /// Split feature; `None` on leaves
    pub feature: Option<String>,
    pub threshold: Option<f64>,
    /// Human-readable rule for the left branch, e.g. `<= 3.500` or `in {a, b}`
    pub condition: Option<String>,
    pub error_rate: f64,
    pub sample_count: usize,
    pub error_count: usize,
    pub depth: usize,
    pub is_leaf: bool,
    pub left: Option<Box<ErrorTreeNode>>,
    pub right: Option<Box<ErrorTreeNode>>,
}

impl ErrorTreeNode {
    pub(crate) fn leaf(sample_count: usize, error_count: usize, depth: usize) -> Self {
        Self {
            feature: None,
            threshold: None,
            condition: None,
            error_rate: rate(error_count, sample_count),
            sample_count,
            error_count,
            depth,
            is_leaf: true,
            left: None,
            right: None,
        }
    }

    pub fn n_leaves(&self) -> usize {
        match (&self.left, &self.right) {
            (Some(l), Some(r)) => l.n_leaves() + r.n_leaves(),
            _ => 1,
        }
    }

    /// Deepest leaf depth
    pub fn max_depth(&self) -> usize {
        match (&self.left, &self.right) {
            (Some(l), Some(r)) => l.max_depth().max(r.max_depth()),
            _ => self.depth,
        }
    }
}

pub(crate) fn rate(errors: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    }
}

/// How the error tree was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeMethod {
    DecisionTree,
    /// Tree fitting failed; a single leaf carries the overall rate
    RootOnly,
}

/// How feature importances were computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportanceMethod {
    Forest,
    /// Absolute Pearson correlation with the error indicator
    Correlation,
}

/// Filter selecting the members of a cohort. Missing values never match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CohortPredicate {
    Equals {
        feature: String,
        value: FeatureValue,
    },
    Range {
        feature: String,
        min: f64,
        max: f64,
        max_inclusive: bool,
    },
}

impl CohortPredicate {
    pub fn feature(&self) -> &str {
        match self {
            CohortPredicate::Equals { feature, .. } | CohortPredicate::Range { feature, .. } => feature,
        }
    }

    pub fn matches(&self, column: &Column, row: usize) -> bool {
        match self {
            CohortPredicate::Equals { value, .. } => {
                let cell = column.value(row);
                !cell.is_missing() && &cell == value
            }
            CohortPredicate::Range { min, max, max_inclusive, .. } => match column.value(row) {
                FeatureValue::Numeric(v) => v >= *min && (v < *max || (*max_inclusive && v <= *max)),
                _ => false,
            },
        }
    }
}

/// Subgroup with an elevated error rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub name: String,
    pub predicate: CohortPredicate,
    pub size: usize,
    pub error_rate: f64,
    pub error_count: usize,
    /// Fraction of the dataset inside the cohort
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueErrorRate {
    pub value: String,
    pub error_rate: f64,
    pub count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinErrorRate {
    pub range: (f64, f64),
    pub error_rate: f64,
    pub count: usize,
    pub error_count: usize,
}

/// Error rates broken down along one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureErrorBreakdown {
    /// Per value, most frequent value first
    Categorical { values: Vec<ValueErrorRate> },
    /// Per non-empty quartile bin
    Continuous {
        bins: Vec<BinErrorRate>,
        mean: Option<f64>,
        std: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub x: usize,
    pub y: usize,
    pub error_rate: f64,
    pub count: usize,
}

/// Error rate over quantile bins of two features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapGrid {
    pub feature_x: String,
    pub feature_y: String,
    /// Non-empty cells only
    pub cells: Vec<HeatmapCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeatmapReport {
    pub grids: Vec<HeatmapGrid>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstCohort {
    pub name: String,
    pub error_rate: f64,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub overall_error_rate: f64,
    pub total_samples: usize,
    pub total_errors: usize,
    pub num_cohorts_identified: usize,
    pub top_error_features: Vec<String>,
    pub worst_cohort: Option<WorstCohort>,
    pub recommendations: Vec<String>,
}

/// Full result of [`super::ErrorAnalyzer::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub overall_error_rate: f64,
    pub total_samples: usize,
    pub total_errors: usize,
    pub error_tree: ErrorTreeNode,
    pub tree_method: TreeMethod,
    pub tree_fallback_reason: Option<String>,
    /// Top cohorts, highest error rate first
    pub cohorts: Vec<Cohort>,
    pub feature_errors: Vec<(String, FeatureErrorBreakdown)>,
    /// Sorted by importance, descending
    pub feature_importances: Vec<(String, f64)>,
    pub importance_method: ImportanceMethod,
    pub importance_fallback_reason: Option<String>,
    pub heatmap: HeatmapReport,
    pub summary: ErrorSummary,
}

impl ErrorReport {
    pub fn cohort(&self, name: &str) -> Option<&Cohort> {
        self.cohorts.iter().find(|c| c.name == name)
    }

    pub fn importance_of(&self, feature: &str) -> Option<f64> {
        self.feature_importances
            .iter()
            .find(|(f, _)| f == feature)
            .map(|(_, v)| *v)
    }
}
