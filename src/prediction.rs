//! Model access for the analyzers that query a model
//!
//! Framework adapters implement [`PredictionCapability`]; plain closures
//! `Fn(&Dataset) -> Result<Array1<f64>>` implement it automatically.

use crate::data::Dataset;
use crate::error::{DiagnosticsError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Batch-in, array-out prediction. Implementations are expected to be
/// deterministic: the same batch must always yield the same predictions.
pub trait PredictionCapability {
    fn predict(&self, batch: &Dataset) -> Result<Array1<f64>>;
}

impl<F> PredictionCapability for F
where
    F: Fn(&Dataset) -> Result<Array1<f64>>,
{
    fn predict(&self, batch: &Dataset) -> Result<Array1<f64>> {
        self(batch)
    }
}

/// Call the model and check it returned one prediction per row
pub fn predict_checked<P: PredictionCapability + ?Sized>(model: &P, batch: &Dataset) -> Result<Array1<f64>> {
    let predictions = model.predict(batch)?;
    if predictions.len() != batch.n_rows() {
        return Err(DiagnosticsError::PredictionError(format!(
            "model returned {} predictions for {} rows",
            predictions.len(),
            batch.n_rows()
        )));
    }
    Ok(predictions)
}

const OUTCOME_TOLERANCE: f64 = 1e-9;

/// Prediction a counterfactual must reach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DesiredOutcome {
    Exact(f64),
    AnyOf(Vec<f64>),
}

impl DesiredOutcome {
    pub fn matches(&self, prediction: f64) -> bool {
        match self {
            DesiredOutcome::Exact(target) => (prediction - target).abs() <= OUTCOME_TOLERANCE,
            DesiredOutcome::AnyOf(targets) => targets
                .iter()
                .any(|t| (prediction - t).abs() <= OUTCOME_TOLERANCE),
        }
    }
}

impl std::fmt::Display for DesiredOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesiredOutcome::Exact(v) => write!(f, "{}", v),
            DesiredOutcome::AnyOf(vs) => {
                let parts: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "any of [{}]", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_capability() {
        let model = |batch: &Dataset| -> Result<Array1<f64>> { Ok(Array1::zeros(batch.n_rows())) };
        let ds = Dataset::new().with_continuous("a", vec![1.0, 2.0]).unwrap();
        assert_eq!(predict_checked(&model, &ds).unwrap().len(), 2);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let model = |_: &Dataset| -> Result<Array1<f64>> { Ok(Array1::zeros(1)) };
        let ds = Dataset::new().with_continuous("a", vec![1.0, 2.0]).unwrap();
        assert!(matches!(predict_checked(&model, &ds), Err(DiagnosticsError::PredictionError(_))));
    }

    #[test]
    fn test_desired_outcome_matching() {
        assert!(DesiredOutcome::Exact(1.0).matches(1.0));
        assert!(!DesiredOutcome::Exact(1.0).matches(0.0));
        assert!(DesiredOutcome::AnyOf(vec![1.0, 2.0]).matches(2.0));
        assert!(!DesiredOutcome::AnyOf(vec![]).matches(0.0));
    }
}
