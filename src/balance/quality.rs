//! Data quality scoring: completeness, uniqueness and type consistency.

use crate::data::{Column, Dataset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Quality report for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// Mean of completeness, uniqueness and consistency (0.0 - 1.0)
    pub overall_score: f64,
    /// Mean per-column completeness
    pub completeness: f64,
    /// 1 - duplicate row rate
    pub uniqueness: f64,
    pub duplicate_rate: f64,
    /// 1 - 0.1 per mixed-type column, floored at 0
    pub consistency: f64,
    pub per_column: Vec<ColumnQuality>,
    pub warnings: Vec<QualityWarning>,
    pub num_rows: usize,
    pub num_columns: usize,
}

/// Quality metrics for a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnQuality {
    pub column: String,
    /// 1 - missing ratio
    pub completeness: f64,
    /// Distinct values over rows
    pub distinct_ratio: f64,
    /// String column holding both numeric-looking and other values
    pub mixed_types: bool,
}

/// Quality warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QualityWarning {
    /// Column has a high proportion of missing values
    HighMissingness { column: String, ratio: f64 },
    /// At most one distinct value
    ConstantColumn { column: String },
    /// Numeric-looking strings mixed with other strings
    MixedTypes { column: String, numeric_count: usize, total_count: usize },
    DuplicateRows { count: usize, total: usize },
}

/// Completeness below this raises [`QualityWarning::HighMissingness`]
const MISSINGNESS_WARNING: f64 = 0.7;
const MIXED_TYPE_PENALTY: f64 = 0.1;

/// Data quality scorer
pub struct DataQualityScorer;

impl DataQualityScorer {
    pub fn score(data: &Dataset) -> DataQualityReport {
        let num_rows = data.n_rows();
        let mut per_column = Vec::with_capacity(data.n_cols());
        let mut warnings = Vec::new();
        let mut total_completeness = 0.0;
        let mut consistency: f64 = 1.0;

        for (name, column) in data.columns() {
            let completeness = if num_rows > 0 {
                1.0 - column.missing_count() as f64 / num_rows as f64
            } else {
                1.0
            };
            let unique = column.n_unique();
            let distinct_ratio = if num_rows > 0 { unique as f64 / num_rows as f64 } else { 0.0 };
            total_completeness += completeness;

            if completeness < MISSINGNESS_WARNING {
                warnings.push(QualityWarning::HighMissingness {
                    column: name.to_string(),
                    ratio: 1.0 - completeness,
                });
            }
            if unique <= 1 && num_rows > 1 {
                warnings.push(QualityWarning::ConstantColumn { column: name.to_string() });
            }

            let mixed = mixed_types(column);
            if let Some((numeric_count, total_count)) = mixed {
                consistency -= MIXED_TYPE_PENALTY;
                warnings.push(QualityWarning::MixedTypes {
                    column: name.to_string(),
                    numeric_count,
                    total_count,
                });
            }

            per_column.push(ColumnQuality {
                column: name.to_string(),
                completeness,
                distinct_ratio,
                mixed_types: mixed.is_some(),
            });
        }

        let duplicates = duplicate_rows(data);
        if duplicates > 0 {
            warnings.push(QualityWarning::DuplicateRows {
                count: duplicates,
                total: num_rows,
            });
        }

        let completeness = if data.n_cols() > 0 {
            total_completeness / data.n_cols() as f64
        } else {
            1.0
        };
        let duplicate_rate = if num_rows > 0 { duplicates as f64 / num_rows as f64 } else { 0.0 };
        let uniqueness = 1.0 - duplicate_rate;
        let consistency = consistency.max(0.0);

        DataQualityReport {
            overall_score: (completeness + uniqueness + consistency) / 3.0,
            completeness,
            uniqueness,
            duplicate_rate,
            consistency,
            per_column,
            warnings,
            num_rows,
            num_columns: data.n_cols(),
        }
    }
}

/// `(numeric, non-missing)` counts when a string column mixes both kinds
fn mixed_types(column: &Column) -> Option<(usize, usize)> {
    let Column::Categorical(values) = column else {
        return None;
    };
    let present: Vec<&String> = values.iter().flatten().collect();
    let numeric = present.iter().filter(|s| s.trim().parse::<f64>().is_ok()).count();
    (numeric > 0 && numeric < present.len()).then_some((numeric, present.len()))
}

/// Rows identical to an earlier row
fn duplicate_rows(data: &Dataset) -> usize {
    let mut seen: HashSet<Vec<Option<String>>> = HashSet::with_capacity(data.n_rows());
    (0..data.n_rows())
        .filter(|&row| {
            let key: Vec<Option<String>> = data.columns().map(|(_, c)| c.key(row)).collect();
            !seen.insert(key)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_quality() {
        let data = Dataset::new()
            .with_continuous("age", vec![18.0, 25.0, 33.0, 41.0])
            .unwrap()
            .with_categorical("city", vec!["a", "b", "c", "d"])
            .unwrap();
        let report = DataQualityScorer::score(&data);
        assert_eq!(report.overall_score, 1.0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_poor_quality() {
        let data = Dataset::new()
            .with_continuous("messy", vec![f64::NAN, f64::NAN, f64::NAN, 1.0, 1.0])
            .unwrap();
        let report = DataQualityScorer::score(&data);
        assert!((report.completeness - 0.4).abs() < 1e-12);
        assert!(report.warnings.iter().any(|w| matches!(w, QualityWarning::HighMissingness { .. })));
        assert!(report.warnings.iter().any(|w| matches!(w, QualityWarning::ConstantColumn { .. })));
        // rows 1, 2 repeat row 0 and row 4 repeats row 3
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, QualityWarning::DuplicateRows { count: 3, total: 5 })));
        assert!(report.overall_score < 0.7);
    }

    #[test]
    fn test_close_values_are_not_duplicates() {
        let data = Dataset::new()
            .with_continuous("x", vec![0.10001, 0.10002, 0.10003, 0.10004])
            .unwrap();
        let report = DataQualityScorer::score(&data);
        assert_eq!(report.uniqueness, 1.0);
        assert!(!report.warnings.iter().any(|w| matches!(w, QualityWarning::DuplicateRows { .. })));
    }

    #[test]
    fn test_mixed_types_penalized() {
        let data = Dataset::new()
            .with_categorical("code", vec!["1", "2", "x", "3"])
            .unwrap()
            .with_categorical("zip", vec!["10", "20", "30", "40"])
            .unwrap();
        let report = DataQualityScorer::score(&data);
        assert!((report.consistency - 0.9).abs() < 1e-12);
        assert!(report.per_column[0].mixed_types);
        assert!(!report.per_column[1].mixed_types);
    }

    #[test]
    fn test_empty_dataset() {
        let report = DataQualityScorer::score(&Dataset::new());
        assert_eq!(report.num_rows, 0);
        assert_eq!(report.num_columns, 0);
        assert_eq!(report.uniqueness, 1.0);
        assert!(report.per_column.is_empty());
        assert!(report.warnings.is_empty());
    }
}
