//! Tree, ensemble and linear estimators the analyzers fit internally
//!
//! These are auxiliary models: the error analyzer grows a tree and a forest
//! on the error indicator, and the causal analyzer fits outcome models.

pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear;
pub mod random_forest;

pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use linear::LinearRegression;
pub use random_forest::{MaxFeatures, RandomForest};
