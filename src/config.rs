//! Combined configuration for all analyzers, loadable from JSON

use crate::balance::DataBalanceConfig;
use crate::causal::CausalConfig;
use crate::counterfactual::CounterfactualConfig;
use crate::error::{DiagnosticsError, Result};
use crate::error_analysis::ErrorAnalysisConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for every analyzer. Missing sections and fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub error_analysis: ErrorAnalysisConfig,
    pub counterfactual: CounterfactualConfig,
    pub causal: CausalConfig,
    pub data_balance: DataBalanceConfig,
}

impl DiagnosticsConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DiagnosticsError::ConfigError(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.error_analysis.validate()?;
        self.counterfactual.validate()?;
        self.causal.validate()?;
        self.data_balance.validate()
    }
}
