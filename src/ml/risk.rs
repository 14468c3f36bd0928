use crate::error::{AppError, Result};
use crate::ml::models::{ClassDistribution, DEFAULT_NO_FAILURE_LABEL, DEFAULT_RISK_THRESHOLD};
use serde::{Deserialize, Serialize};

/// `1 - P(no_failure_label)`, clamped into [0, 1]
pub fn aggregate_failure_risk(distribution: &ClassDistribution, no_failure_label: &str) -> Result<f64> {
    let no_failure = distribution
        .get(no_failure_label)
        .ok_or_else(|| AppError::LabelNotFound(no_failure_label.to_string()))?;

    Ok((1.0 - no_failure).clamp(0.0, 1.0))
}

/// Outcome of checking one distribution against the policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Probability of the no-failure class
    pub no_failure_probability: f64,

    /// Complement of `no_failure_probability`
    pub aggregate_risk: f64,

    /// Threshold in force
    pub threshold: f64,

    /// `aggregate_risk > threshold`
    pub warning: bool,
}

/// Risk alerting policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    no_failure_label: String,
    threshold: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            no_failure_label: DEFAULT_NO_FAILURE_LABEL.to_string(),
            threshold: DEFAULT_RISK_THRESHOLD,
        }
    }
}

impl RiskPolicy {
    pub fn new(no_failure_label: impl Into<String>, threshold: f64) -> Result<Self> {
        let no_failure_label = no_failure_label.into();

        if no_failure_label.trim().is_empty() {
            return Err(AppError::Configuration(
                "no-failure label must not be empty".to_string(),
            ));
        }
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Configuration(format!(
                "risk threshold {} outside [0, 1]",
                threshold
            )));
        }

        Ok(Self {
            no_failure_label,
            threshold,
        })
    }

    pub fn no_failure_label(&self) -> &str {
        &self.no_failure_label
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn aggregate_failure_risk(&self, distribution: &ClassDistribution) -> Result<f64> {
        aggregate_failure_risk(distribution, &self.no_failure_label)
    }

    pub fn assess(&self, distribution: &ClassDistribution) -> Result<RiskAssessment> {
        let aggregate_risk = self.aggregate_failure_risk(distribution)?;

        Ok(RiskAssessment {
            no_failure_probability: 1.0 - aggregate_risk,
            aggregate_risk,
            threshold: self.threshold,
            warning: aggregate_risk > self.threshold,
        })
    }
}
