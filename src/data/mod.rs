//! Tabular data model shared by every analyzer
//!
//! A [`Dataset`] is an ordered list of named columns. Each column is either
//! continuous (`f64`) or categorical (`String`); `None` marks a missing value
//! and `NaN` is normalized to `None` on the way in. An [`Instance`] is a single
//! row addressed by feature name.

use crate::error::{DiagnosticsError, Result};
use ndarray::Array2;
use polars::prelude::{DataFrame, DataType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// One cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
    Missing,
}

impl FeatureValue {
    /// Numeric view; categorical strings that parse as numbers count too
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Categorical(s) => s.trim().parse::<f64>().ok(),
            FeatureValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FeatureValue::Numeric(_))
    }

    /// Exact string identity for grouping and equality. Numbers use the
    /// shortest round-trip form, so distinct floats never share a key;
    /// `Display` rounds and is for messages only.
    pub fn key(&self) -> Option<String> {
        match self {
            FeatureValue::Numeric(v) if *v == 0.0 => Some("0".to_string()),
            FeatureValue::Numeric(v) => Some(v.to_string()),
            FeatureValue::Categorical(s) => Some(s.clone()),
            FeatureValue::Missing => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Numeric(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{:.4}", v)
                }
            }
            FeatureValue::Categorical(s) => write!(f, "{}", s),
            FeatureValue::Missing => write!(f, "<missing>"),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            FeatureValue::Missing
        } else {
            FeatureValue::Numeric(v)
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Categorical(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Categorical(v)
    }
}

/// Bit pattern used to compare floats for equality in distinct-value sets
pub(crate) fn float_key(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

/// Column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Continuous(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Continuous(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, Column::Categorical(_))
    }

    pub fn value(&self, row: usize) -> FeatureValue {
        match self {
            Column::Continuous(v) => v
                .get(row)
                .copied()
                .flatten()
                .map_or(FeatureValue::Missing, FeatureValue::Numeric),
            Column::Categorical(v) => v
                .get(row)
                .cloned()
                .flatten()
                .map_or(FeatureValue::Missing, FeatureValue::Categorical),
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Continuous(v) => v.get(row).map_or(true, |x| x.is_none()),
            Column::Categorical(v) => v.get(row).map_or(true, |x| x.is_none()),
        }
    }

    pub fn missing_count(&self) -> usize {
        match self {
            Column::Continuous(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Number of distinct non-missing values
    pub fn n_unique(&self) -> usize {
        match self {
            Column::Continuous(v) => v.iter().flatten().map(|x| float_key(*x)).collect::<BTreeSet<_>>().len(),
            Column::Categorical(v) => v.iter().flatten().collect::<BTreeSet<_>>().len(),
        }
    }

    /// Non-missing values as `f64`; categorical cells that do not parse are skipped
    pub fn numeric_values(&self) -> Vec<f64> {
        match self {
            Column::Continuous(v) => v.iter().flatten().copied().collect(),
            Column::Categorical(v) => v.iter().flatten().filter_map(|s| s.trim().parse().ok()).collect(),
        }
    }

    /// Sorted distinct non-missing values rendered as strings
    pub fn levels(&self) -> Vec<String> {
        match self {
            Column::Categorical(v) => v.iter().flatten().cloned().collect::<BTreeSet<_>>().into_iter().collect(),
            Column::Continuous(v) => {
                let mut values: Vec<f64> = v.iter().flatten().copied().collect();
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                values.dedup_by(|a, b| float_key(*a) == float_key(*b));
                values.into_iter().filter_map(|x| FeatureValue::Numeric(x).key()).collect()
            }
        }
    }

    /// Exact grouping key of a cell, see [`FeatureValue::key`]
    pub fn key(&self, row: usize) -> Option<String> {
        self.value(row).key()
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Continuous(v) => Column::Continuous(rows.iter().map(|&r| v.get(r).copied().flatten()).collect()),
            Column::Categorical(v) => Column::Categorical(rows.iter().map(|&r| v.get(r).cloned().flatten()).collect()),
        }
    }

    /// Ordinal encoding: continuous values as-is (missing -> column mean),
    /// categorical values as their rank among sorted levels (missing -> -1)
    pub fn encode(&self) -> Vec<f64> {
        match self {
            Column::Continuous(v) => {
                let present: Vec<f64> = v.iter().flatten().copied().collect();
                let fill = if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                };
                v.iter().map(|x| x.unwrap_or(fill)).collect()
            }
            Column::Categorical(v) => {
                let codes: HashMap<String, f64> = self
                    .levels()
                    .into_iter()
                    .enumerate()
                    .map(|(i, level)| (level, i as f64))
                    .collect();
                v.iter()
                    .map(|x| x.as_ref().and_then(|s| codes.get(s).copied()).unwrap_or(-1.0))
                    .collect()
            }
        }
    }
}

/// Encoding learned from one column, replayable on new data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnEncoding {
    /// Values as-is; missing cells take `fill`
    Continuous { fill: f64 },
    /// Rank among the sorted `levels`; missing cells become -1
    Categorical { levels: Vec<String> },
}

impl ColumnEncoding {
    /// The encoding [`Column::encode`] applies to `column`
    pub fn fit(column: &Column) -> Self {
        match column {
            Column::Continuous(_) => ColumnEncoding::Continuous {
                fill: crate::stats::mean(&column.numeric_values()).unwrap_or(0.0),
            },
            Column::Categorical(_) => ColumnEncoding::Categorical { levels: column.levels() },
        }
    }

    /// Encode `column` the way the fitted column was encoded. A level the
    /// fitted column never held is a `DataError`.
    pub fn apply(&self, name: &str, column: &Column) -> Result<Vec<f64>> {
        match self {
            ColumnEncoding::Continuous { fill } => (0..column.len())
                .map(|row| match column.value(row) {
                    FeatureValue::Missing => Ok(*fill),
                    value => value.as_f64().ok_or_else(|| {
                        DiagnosticsError::DataError(format!(
                            "column '{}' has non-numeric value '{}' at row {}",
                            name, value, row
                        ))
                    }),
                })
                .collect(),
            ColumnEncoding::Categorical { levels } => (0..column.len())
                .map(|row| match column.key(row) {
                    None => Ok(-1.0),
                    Some(key) => levels.binary_search(&key).map(|code| code as f64).map_err(|_| {
                        DiagnosticsError::DataError(format!(
                            "column '{}' has level '{}' not seen at fit time",
                            name, key
                        ))
                    }),
                })
                .collect(),
        }
    }
}

/// Ordered set of named, equally long columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a continuous column; `NaN` becomes missing
    pub fn with_continuous(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let column = Column::Continuous(values.into_iter().map(|v| (!v.is_nan()).then_some(v)).collect());
        self.push_column(name, column)?;
        Ok(self)
    }

    pub fn with_categorical<S: Into<String>>(mut self, name: impl Into<String>, values: Vec<S>) -> Result<Self> {
        let column = Column::Categorical(values.into_iter().map(|v| Some(v.into())).collect());
        self.push_column(name, column)?;
        Ok(self)
    }

    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.push_column(name, column)?;
        Ok(self)
    }

    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(DiagnosticsError::DataError(format!("duplicate column '{}'", name)));
        }
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(DiagnosticsError::ShapeMismatch {
                expected: format!("column '{}' with {} rows", name, self.n_rows()),
                actual: format!("{} rows", column.len()),
            });
        }
        let column = match column {
            Column::Continuous(v) => Column::Continuous(v.into_iter().map(|x| x.filter(|f| !f.is_nan())).collect()),
            other => other,
        };
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Convert a polars frame: numeric dtypes become continuous, everything else categorical
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let mut dataset = Dataset::new();
        for col in df.get_columns() {
            let name = col.name().to_string();
            let column = match col.dtype() {
                DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64 => {
                    let cast = col.cast(&DataType::Float64)?;
                    let values = cast.f64()?.into_iter().collect();
                    Column::Continuous(values)
                }
                _ => {
                    let cast = col.cast(&DataType::String)?;
                    let values = cast.str()?.into_iter().map(|v| v.map(str::to_string)).collect();
                    Column::Categorical(values)
                }
            };
            dataset.push_column(name, column)?;
        }
        Ok(dataset)
    }

    /// Build a dataset from rows sharing the first row's feature order.
    /// A feature holding any categorical value becomes a categorical column.
    pub fn from_instances(instances: &[Instance]) -> Result<Self> {
        let Some(first) = instances.first() else {
            return Ok(Dataset::new());
        };
        let names: Vec<String> = first.names().map(str::to_string).collect();

        for (i, inst) in instances.iter().enumerate() {
            if inst.len() != names.len() || inst.names().zip(&names).any(|(a, b)| a != b) {
                return Err(DiagnosticsError::ValidationError(format!(
                    "instance {} does not share the feature layout of instance 0",
                    i
                )));
            }
        }

        let mut dataset = Dataset::new();
        for (j, name) in names.iter().enumerate() {
            let cells: Vec<&FeatureValue> = instances.iter().map(|inst| &inst.values[j].1).collect();
            let categorical = cells.iter().any(|v| matches!(v, FeatureValue::Categorical(_)));
            let column = if categorical {
                Column::Categorical(
                    cells
                        .iter()
                        .map(|v| v.key())
                        .collect(),
                )
            } else {
                Column::Continuous(cells.iter().map(|v| v.as_f64()).collect())
            };
            dataset.push_column(name.clone(), column)?;
        }
        Ok(dataset)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Column lookup that fails with `FeatureNotFound`
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| DiagnosticsError::FeatureNotFound(name.to_string()))
    }

    /// `(name, column)` pairs in order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub fn row(&self, index: usize) -> Result<Instance> {
        if index >= self.n_rows() {
            return Err(DiagnosticsError::ValidationError(format!(
                "row {} out of range for {} rows",
                index,
                self.n_rows()
            )));
        }
        Ok(Instance {
            values: self.columns().map(|(n, c)| (n.to_string(), c.value(index))).collect(),
        })
    }

    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
        }
    }

    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Dataset> {
        let mut out = Dataset::new();
        for name in names {
            let name = name.as_ref();
            out.push_column(name, self.require(name)?.clone())?;
        }
        Ok(out)
    }

    /// Every column except the named ones
    pub fn without_columns<S: AsRef<str>>(&self, names: &[S]) -> Dataset {
        let mut out = Dataset::new();
        for (name, column) in self.columns() {
            if !names.iter().any(|n| n.as_ref() == name) {
                out.names.push(name.to_string());
                out.columns.push(column.clone());
            }
        }
        out
    }

    /// Dense numeric matrix, one column per feature, see [`Column::encode`]
    pub fn to_matrix(&self) -> Array2<f64> {
        let encoded: Vec<Vec<f64>> = self.columns.iter().map(Column::encode).collect();
        Array2::from_shape_fn((self.n_rows(), self.n_cols()), |(i, j)| encoded[j][i])
    }

    /// Per-column encodings matching [`Self::to_matrix`]
    pub fn encodings(&self) -> Vec<(String, ColumnEncoding)> {
        self.columns()
            .map(|(name, column)| (name.to_string(), ColumnEncoding::fit(column)))
            .collect()
    }

    /// Dense matrix of the encoded columns, in `encodings` order, replaying
    /// encodings fitted on another dataset
    pub fn to_matrix_with(&self, encodings: &[(String, ColumnEncoding)]) -> Result<Array2<f64>> {
        let encoded = encodings
            .iter()
            .map(|(name, encoding)| encoding.apply(name, self.require(name)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Array2::from_shape_fn((self.n_rows(), encoded.len()), |(i, j)| encoded[j][i]))
    }

    /// Numeric column with no missing cells; categorical columns must parse as numbers
    pub fn numeric_column(&self, name: &str) -> Result<ndarray::Array1<f64>> {
        let column = self.require(name)?;
        (0..column.len())
            .map(|i| {
                column.value(i).as_f64().ok_or_else(|| {
                    DiagnosticsError::DataError(format!("column '{}' has a non-numeric or missing value at row {}", name, i))
                })
            })
            .collect()
    }
}

/// Single row addressed by feature name, in dataset column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    values: Vec<(String, FeatureValue)>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a feature, appending it when absent
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One-row dataset
    pub fn to_dataset(&self) -> Result<Dataset> {
        Dataset::from_instances(std::slice::from_ref(self))
    }
}
