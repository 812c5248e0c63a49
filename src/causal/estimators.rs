//! Treatment effect estimators
//!
//! One [`EffectEstimator`] per [`CausalMethod`], chosen when the analyzer is
//! built. Estimators work on encoded arrays; the analyzer owns column handling.

use super::CausalConfig;
use crate::error::{DiagnosticsError, Result};
use crate::estimators::{GradientBoostingConfig, GradientBoostingRegressor, LinearRegression, RandomForest};
use crate::stats;
use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Residual variance below this share of the treatment variance counts as none
const RESIDUAL_TOLERANCE: f64 = 1e-10;

/// Estimation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalMethod {
    /// Residualize treatment on confounders, regress outcome on the residual
    Linear,
    /// T-learner: one forest per treatment arm
    Forest,
    /// S-learner: one boosted model with treatment as a feature
    #[serde(alias = "metalearner")]
    MetaLearner,
    /// Correlation slope, no adjustment
    Simple,
}

impl std::fmt::Display for CausalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CausalMethod::Linear => "linear",
            CausalMethod::Forest => "forest",
            CausalMethod::MetaLearner => "metalearner",
            CausalMethod::Simple => "simple",
        };
        f.write_str(name)
    }
}

/// Encoded inputs shared by every estimator
pub struct EffectInputs<'a> {
    pub treatment: &'a Array1<f64>,
    pub outcome: &'a Array1<f64>,
    /// Encoded confounders, one row per sample
    pub confounders: Option<&'a Array2<f64>>,
}

impl EffectInputs<'_> {
    fn n_samples(&self) -> usize {
        self.treatment.len()
    }

    /// Confounders, or a constant column when there are none
    fn design(&self) -> Array2<f64> {
        match self.confounders {
            Some(w) => w.clone(),
            None => Array2::ones((self.n_samples(), 1)),
        }
    }
}

/// Model able to score CATE on new confounder rows
#[derive(Debug, Clone)]
pub enum CateModel {
    TwoModel { treated: RandomForest, control: RandomForest },
    SingleModel { model: GradientBoostingRegressor },
}

impl CateModel {
    /// `w` holds confounder rows, or a single constant column when the
    /// model was fitted without confounders
    pub fn predict(&self, w: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            CateModel::TwoModel { treated, control } => Ok(treated.predict(w)? - control.predict(w)?),
            CateModel::SingleModel { model } => {
                let n = w.nrows();
                let with_one = concatenate![Axis(1), w.view(), Array2::<f64>::ones((n, 1)).view()];
                let with_zero = concatenate![Axis(1), w.view(), Array2::<f64>::zeros((n, 1)).view()];
                Ok(model.predict(&with_one)? - model.predict(&with_zero)?)
            }
        }
    }
}

/// What an estimator learned
#[derive(Debug, Clone)]
pub struct FittedEffect {
    pub ate: f64,
    /// Per-sample effects on the fitting data, when the method has them
    pub cate: Option<Array1<f64>>,
    pub model: Option<CateModel>,
}

impl FittedEffect {
    fn constant(ate: f64) -> Self {
        Self { ate, cate: None, model: None }
    }
}

/// Effect estimation strategy
pub trait EffectEstimator: Send + Sync + std::fmt::Debug {
    fn method(&self) -> CausalMethod;

    fn fit(&self, inputs: &EffectInputs<'_>) -> Result<FittedEffect>;
}

/// Build the estimator for `method`
pub fn estimator_for(method: CausalMethod, config: &CausalConfig) -> Box<dyn EffectEstimator> {
    match method {
        CausalMethod::Linear => Box::new(LinearEffect),
        CausalMethod::Forest => Box::new(TwoModelEffect {
            n_trees: config.forest_trees,
            max_depth: config.forest_max_depth,
            random_state: config.random_state.unwrap_or(42),
        }),
        CausalMethod::MetaLearner => Box::new(SingleModelEffect {
            boosting: GradientBoostingConfig {
                n_estimators: config.boosting_rounds,
                max_depth: config.boosting_max_depth,
                random_state: config.random_state,
                ..GradientBoostingConfig::default()
            },
        }),
        CausalMethod::Simple => Box::new(SimpleEffect),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinearEffect;

impl EffectEstimator for LinearEffect {
    fn method(&self) -> CausalMethod {
        CausalMethod::Linear
    }

    fn fit(&self, inputs: &EffectInputs<'_>) -> Result<FittedEffect> {
        let n = inputs.n_samples();
        let regressor = match inputs.confounders {
            Some(w) => {
                let mut stage_one = LinearRegression::new();
                stage_one.fit(w, inputs.treatment)?;
                let residual = inputs.treatment - &stage_one.predict(w)?;
                let spread = inputs.treatment.var(0.0);
                if !(residual.var(0.0) > RESIDUAL_TOLERANCE * spread) {
                    return Err(DiagnosticsError::ComputationError(
                        "treatment is fully explained by the confounders".to_string(),
                    ));
                }
                residual.into_shape_with_order((n, 1))?
            }
            None => inputs.treatment.clone().into_shape_with_order((n, 1))?,
        };

        let mut stage_two = LinearRegression::new();
        stage_two.fit(&regressor, inputs.outcome)?;
        let ate = stage_two
            .coefficients()
            .and_then(|c| c.first().copied())
            .ok_or_else(|| DiagnosticsError::ComputationError("regression produced no coefficient".to_string()))?;
        Ok(FittedEffect::constant(ate))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TwoModelEffect {
    n_trees: usize,
    max_depth: usize,
    random_state: u64,
}

impl EffectEstimator for TwoModelEffect {
    fn method(&self) -> CausalMethod {
        CausalMethod::Forest
    }

    fn fit(&self, inputs: &EffectInputs<'_>) -> Result<FittedEffect> {
        let t = inputs.treatment;
        let split = stats::median(&t.to_vec())
            .ok_or_else(|| DiagnosticsError::ComputationError("empty treatment".to_string()))?;

        let mut mask: Vec<bool> = t.iter().map(|&v| v > split).collect();
        if !mask.contains(&true) {
            mask = t.iter().map(|&v| v >= split).collect();
        }
        let treated: Vec<usize> = (0..t.len()).filter(|&i| mask[i]).collect();
        let control: Vec<usize> = (0..t.len()).filter(|&i| !mask[i]).collect();
        if treated.is_empty() || control.is_empty() {
            return Err(DiagnosticsError::ComputationError(
                "treatment does not split into treated and control arms".to_string(),
            ));
        }

        let w = inputs.design();
        let fit_arm = |rows: &[usize]| -> Result<RandomForest> {
            let mut forest = RandomForest::new_regressor(self.n_trees)
                .with_max_depth(self.max_depth)
                .with_random_state(self.random_state);
            forest.fit(&w.select(Axis(0), rows), &inputs.outcome.select(Axis(0), rows))?;
            Ok(forest)
        };
        let model = CateModel::TwoModel {
            treated: fit_arm(&treated)?,
            control: fit_arm(&control)?,
        };

        let cate = model.predict(&w)?;
        let ate = cate.mean().unwrap_or(0.0);
        Ok(FittedEffect {
            ate,
            cate: Some(cate),
            model: Some(model),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SingleModelEffect {
    boosting: GradientBoostingConfig,
}

impl EffectEstimator for SingleModelEffect {
    fn method(&self) -> CausalMethod {
        CausalMethod::MetaLearner
    }

    fn fit(&self, inputs: &EffectInputs<'_>) -> Result<FittedEffect> {
        let n = inputs.n_samples();
        let w = inputs.design();
        let t_column = inputs.treatment.view().into_shape_with_order((n, 1))?;
        let features = concatenate![Axis(1), w.view(), t_column];

        let mut boosted = GradientBoostingRegressor::new(self.boosting.clone());
        boosted.fit(&features, inputs.outcome)?;
        let model = CateModel::SingleModel { model: boosted };

        let cate = model.predict(&w)?;
        let ate = cate.mean().unwrap_or(0.0);
        Ok(FittedEffect {
            ate,
            cate: Some(cate),
            model: Some(model),
        })
    }
}

/// `corr(T, Y) * std(Y) / std(T)`; zero when the slope is undefined
#[derive(Debug, Clone, Copy)]
pub struct SimpleEffect;

impl EffectEstimator for SimpleEffect {
    fn method(&self) -> CausalMethod {
        CausalMethod::Simple
    }

    fn fit(&self, inputs: &EffectInputs<'_>) -> Result<FittedEffect> {
        let t = inputs.treatment.to_vec();
        let y = inputs.outcome.to_vec();
        let std_t = stats::std_dev(&t, 0).unwrap_or(0.0);
        let std_y = stats::std_dev(&y, 0).unwrap_or(0.0);
        let ate = match stats::pearson(&t, &y) {
            Some(r) if std_t > 0.0 => r * std_y / std_t,
            _ => 0.0,
        };
        Ok(FittedEffect::constant(ate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_simple_slope_matches_ols() {
        let t = array![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = array![1.0, 3.0, 5.0, 7.0, 9.0];
        let fitted = SimpleEffect
            .fit(&EffectInputs { treatment: &t, outcome: &y, confounders: None })
            .unwrap();
        assert_relative_eq!(fitted.ate, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_simple_constant_treatment_is_zero() {
        let t = array![1.0, 1.0, 1.0];
        let y = array![1.0, 2.0, 3.0];
        let fitted = SimpleEffect
            .fit(&EffectInputs { treatment: &t, outcome: &y, confounders: None })
            .unwrap();
        assert_eq!(fitted.ate, 0.0);
    }

    #[test]
    fn test_linear_adjusts_for_confounder() {
        // t depends on w, y = 3 t + 5 w
        let w: Vec<f64> = (0..30).map(|i| (i % 5) as f64).collect();
        let t: Array1<f64> = (0..30).map(|i| (i % 3) as f64 + 0.5 * w[i]).collect();
        let y: Array1<f64> = (0..30).map(|i| 3.0 * t[i] + 5.0 * w[i]).collect();
        let w = Array2::from_shape_vec((30, 1), w).unwrap();
        let fitted = LinearEffect
            .fit(&EffectInputs { treatment: &t, outcome: &y, confounders: Some(&w) })
            .unwrap();
        assert_relative_eq!(fitted.ate, 3.0, epsilon = 1e-8);
        assert!(fitted.cate.is_none());
    }

    #[test]
    fn test_two_model_binary_difference_in_means() {
        let t: Array1<f64> = (0..40).map(|i| (i % 2) as f64).collect();
        let y: Array1<f64> = t.mapv(|v| 1.0 + 2.0 * v);
        let estimator = TwoModelEffect { n_trees: 5, max_depth: 3, random_state: 7 };
        let fitted = estimator
            .fit(&EffectInputs { treatment: &t, outcome: &y, confounders: None })
            .unwrap();
        assert_relative_eq!(fitted.ate, 2.0, epsilon = 1e-9);
        assert_eq!(fitted.cate.unwrap().len(), 40);
    }

    #[test]
    fn test_two_model_needs_two_arms() {
        let t = array![1.0, 1.0, 1.0, 1.0];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let estimator = TwoModelEffect { n_trees: 3, max_depth: 2, random_state: 1 };
        assert!(estimator
            .fit(&EffectInputs { treatment: &t, outcome: &y, confounders: None })
            .is_err());
    }
}
