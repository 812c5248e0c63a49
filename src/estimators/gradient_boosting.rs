//! Gradient boosted regression trees (squared loss)

use super::decision_tree::DecisionTree;
use crate::error::{DiagnosticsError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Gradient boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row fraction drawn per round
    pub subsample: f64,
    /// Column fraction drawn per round
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

/// Gradient boosting regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_prediction: f64,
    n_features: usize,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_prediction: 0.0,
            n_features: 0,
        }
    }

    /// Fit successive trees to the residuals of the running prediction
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(DiagnosticsError::length_mismatch("y", n_samples, y.len()));
        }
        if n_samples == 0 || n_features == 0 {
            return Err(DiagnosticsError::ValidationError(
                "gradient boosting needs at least one sample and one feature".to_string(),
            ));
        }
        for (name, fraction) in [
            ("subsample", self.config.subsample),
            ("colsample_bytree", self.config.colsample_bytree),
        ] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(DiagnosticsError::InvalidParameter {
                    name: name.to_string(),
                    value: fraction.to_string(),
                    reason: "must be in (0, 1]".to_string(),
                });
            }
        }

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees.clear();
        self.col_indices_per_tree.clear();
        self.n_features = n_features;
        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);

        for round in 0..self.config.n_estimators {
            let residuals = y - &predictions;
            let rows = draw_indices(n_samples, self.config.subsample, &mut rng);
            let cols = draw_indices(n_features, self.config.colsample_bytree, &mut rng);

            let x_sub = x.select(Axis(0), &rows).select(Axis(1), &cols);
            let r_sub = residuals.select(Axis(0), &rows);

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_random_state(round as u64);
            tree.fit(&x_sub, &r_sub)?;

            let update = tree.predict(&x.select(Axis(1), &cols))?;
            predictions.scaled_add(self.config.learning_rate, &update);

            self.trees.push(tree);
            self.col_indices_per_tree.push(cols);
        }

        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() && self.n_features == 0 {
            return Err(DiagnosticsError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(DiagnosticsError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, cols) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let update = tree.predict(&x.select(Axis(1), cols))?;
            predictions.scaled_add(self.config.learning_rate, &update);
        }
        Ok(predictions)
    }
}

/// Sorted random subset holding `ceil(n * fraction)` indices
fn draw_indices(n: usize, fraction: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..n).collect();
    }
    let size = ((n as f64) * fraction).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(size);
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_nonlinear_target() {
        let n = 80;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 / 10.0 } else { (i % 3) as f64 });
        let y = x.column(0).mapv(|v| if v > 4.0 { 3.0 } else { -1.0 });

        let mut model = GradientBoostingRegressor::new(GradientBoostingConfig::default());
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        let mse = (&preds - &y).mapv(|v| v * v).mean().unwrap();
        assert!(mse < 0.1, "mse = {}", mse);
    }

    #[test]
    fn test_subsampling_is_seeded() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| (i * (j + 1)) as f64 % 7.0);
        let y = x.column(0).to_owned();
        let config = GradientBoostingConfig {
            subsample: 0.7,
            colsample_bytree: 0.67,
            n_estimators: 10,
            ..Default::default()
        };

        let mut a = GradientBoostingRegressor::new(config.clone());
        let mut b = GradientBoostingRegressor::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_rejects_bad_fraction() {
        let config = GradientBoostingConfig { subsample: 0.0, ..Default::default() };
        let err = GradientBoostingRegressor::new(config)
            .fit(&Array2::zeros((3, 1)), &Array1::zeros(3))
            .unwrap_err();
        assert!(matches!(err, DiagnosticsError::InvalidParameter { .. }));
    }

    #[test]
    fn test_predict_before_fit() {
        let model = GradientBoostingRegressor::new(GradientBoostingConfig::default());
        assert!(matches!(model.predict(&Array2::zeros((1, 1))), Err(DiagnosticsError::ModelNotFitted)));
    }
}
