//! RAI Diagnostics - Post-hoc model diagnostics engine
//!
//! This crate inspects a trained model and its data:
//! - Where the model errs (error cohorts, error trees, heatmaps)
//! - What minimal changes would flip a prediction (counterfactuals)
//! - How much a treatment drives an outcome (ATE, CATE, what-if, policies)
//! - Whether the training data is representative (balance and fairness)
//!
//! # Modules
//!
//! ## Analyzers
//! - [`error_analysis`] - Error cohorts, error trees, feature breakdowns, heatmaps
//! - [`counterfactual`] - Greedy, random and genetic counterfactual search
//! - [`causal`] - Treatment effect estimation, what-if scenarios, policy evaluation
//! - [`balance`] - Feature, label and sensitive-attribute balance, data quality
//!
//! ## Data & Statistics
//! - [`data`] - Typed tabular datasets and instances
//! - [`stats`] - Descriptive statistics and fitted per-feature summaries
//! - [`estimators`] - Decision trees, forests, boosting, least squares
//!
//! ## Model Access
//! - [`prediction`] - Prediction capability for querying external models
//! - [`control`] - Deadlines and cancellation for long searches
//!
//! ## Infrastructure
//! - [`config`] - Combined JSON configuration
//! - [`logging`] - Tracing subscriber setup

// Core error handling
pub mod error;

// Analyzers
pub mod error_analysis;
pub mod counterfactual;
pub mod causal;
pub mod balance;

// Data & statistics
pub mod data;
pub mod stats;
pub mod estimators;

// Model access
pub mod prediction;
pub mod control;

// Infrastructure
pub mod config;
pub mod logging;

pub use error::{DiagnosticsError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{DiagnosticsError, Result};

    // Data
    pub use crate::data::{Column, Dataset, FeatureValue, Instance};
    pub use crate::stats::{FeatureStatistics, FeatureSummary};

    // Model access
    pub use crate::control::{CancellationToken, SearchBudget};
    pub use crate::prediction::{DesiredOutcome, PredictionCapability};

    // Error analysis
    pub use crate::error_analysis::{Cohort, ErrorAnalysisConfig, ErrorAnalyzer, ErrorReport};

    // Counterfactuals
    pub use crate::counterfactual::{
        Counterfactual, CounterfactualAnalyzer, CounterfactualConfig, CounterfactualExplanation,
        SearchStrategy,
    };

    // Causal analysis
    pub use crate::causal::{
        CausalAnalyzer, CausalConfig, CausalMethod, Policy, PolicyEffect, TreatmentEffect, Variable,
        WhatIfResult, WhatIfScenario,
    };

    // Data balance
    pub use crate::balance::{BalanceReport, DataBalanceAnalyzer, DataBalanceConfig, DataQualityScorer};

    // Configuration
    pub use crate::config::DiagnosticsConfig;
}
