//! Probability-of-default scoring boundary.
//!
//! The trained estimator and its feature scaler are produced outside this
//! crate. They are loaded once at startup into an immutable adapter and
//! shared (`Arc<dyn ScoringAdapter>`) by the decision engine and the
//! backtest.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LendingError, Result};

/// Number of model inputs, in fixed order: income, fico, dti, loan amount.
pub const FEATURE_COUNT: usize = 4;

/// Ordered feature tuple consumed by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApplicantFeatures {
    pub income: f64,
    pub fico: f64,
    pub dti: f64,
    pub loan_amount: f64,
}

impl ApplicantFeatures {
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [self.income, self.fico, self.dti, self.loan_amount]
    }
}

/// Anything that turns applicant features into a probability of default.
///
/// Implementations must be safe to call from many threads at once; the live
/// decision path and the backtest share one instance.
pub trait ScoringAdapter: Send + Sync {
    fn predict_default_probability(&self, features: &ApplicantFeatures) -> Result<f64>;
}

// ============================================================================
// LOGISTIC MODEL ARTIFACT
// ============================================================================

/// Standard-scaler parameters: `z = (x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }
}

/// Serialized artifact bundle: scaler + logistic regression weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticScorer {
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub scaler: FeatureScaler,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticScorer {
    /// Build and validate a scorer from raw parameters.
    pub fn new(scaler: FeatureScaler, coefficients: Vec<f64>, intercept: f64) -> Result<Self> {
        let scorer = Self {
            feature_names: default_feature_names(),
            scaler,
            coefficients,
            intercept,
        };
        scorer.validate()?;
        Ok(scorer)
    }

    /// The data-generating logit used to build the historical corpus:
    /// `risk = (850 - fico) * 0.05 + dti * 0.2 - income / 10000`,
    /// `p = sigmoid(risk - 15)`. Loan amount carries no weight.
    pub fn reference() -> Self {
        Self {
            feature_names: default_feature_names(),
            scaler: FeatureScaler::identity(),
            coefficients: vec![-1.0 / 10_000.0, -0.05, 0.2, 0.0],
            intercept: 850.0 * 0.05 - 15.0,
        }
    }

    /// Load the artifact bundle from JSON. Any failure here means the
    /// service has no scorer, so it surfaces as `ScoringUnavailable`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LendingError::scoring(format!("cannot read model artifact {}: {e}", path.display()))
        })?;

        let scorer: LogisticScorer = serde_json::from_str(&content).map_err(|e| {
            LendingError::scoring(format!("malformed model artifact {}: {e}", path.display()))
        })?;

        scorer.validate()?;
        Ok(scorer)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LendingError::scoring(format!("cannot serialize model artifact: {e}")))
    }

    fn validate(&self) -> Result<()> {
        let lengths = [
            ("scaler.mean", self.scaler.mean.len()),
            ("scaler.scale", self.scaler.scale.len()),
            ("coefficients", self.coefficients.len()),
        ];
        for (name, len) in lengths {
            if len != FEATURE_COUNT {
                return Err(LendingError::scoring(format!(
                    "{name} has {len} entries, expected {FEATURE_COUNT}"
                )));
            }
        }

        let all_finite = self
            .scaler
            .mean
            .iter()
            .chain(&self.scaler.scale)
            .chain(&self.coefficients)
            .chain(std::iter::once(&self.intercept))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(LendingError::scoring("model artifact contains non-finite values"));
        }

        if self.scaler.scale.iter().any(|s| *s == 0.0) {
            return Err(LendingError::scoring("scaler.scale contains a zero entry"));
        }

        Ok(())
    }
}

impl ScoringAdapter for LogisticScorer {
    fn predict_default_probability(&self, features: &ApplicantFeatures) -> Result<f64> {
        let x = features.as_array();
        let logit = (0..FEATURE_COUNT).fold(self.intercept, |acc, i| {
            let scaled = (x[i] - self.scaler.mean[i]) / self.scaler.scale[i];
            acc + self.coefficients[i] * scaled
        });

        Ok(sigmoid(logit))
    }
}

fn default_feature_names() -> Vec<String> {
    ["income", "fico", "dti", "loan_amnt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ============================================================================
// FIXED-PROBABILITY ADAPTER
// ============================================================================

/// Returns the same probability for every applicant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantScorer {
    probability: f64,
}

impl ConstantScorer {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl ScoringAdapter for ConstantScorer {
    fn predict_default_probability(&self, _features: &ApplicantFeatures) -> Result<f64> {
        Ok(self.probability)
    }
}

/// Installed when no artifact could be loaded at startup: every call fails
/// with `ScoringUnavailable`, so the service stays up for audit reads.
#[derive(Debug, Clone)]
pub struct UnavailableScorer {
    reason: String,
}

impl UnavailableScorer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ScoringAdapter for UnavailableScorer {
    fn predict_default_probability(&self, _features: &ApplicantFeatures) -> Result<f64> {
        Err(LendingError::scoring(self.reason.clone()))
    }
}

/// Startup loader for long-running processes: a bad artifact degrades to
/// `UnavailableScorer` instead of stopping the service.
pub fn load_or_unavailable(path: &Path) -> std::sync::Arc<dyn ScoringAdapter> {
    match LogisticScorer::from_file(path) {
        Ok(scorer) => {
            tracing::info!(path = %path.display(), "scoring model loaded");
            std::sync::Arc::new(scorer)
        }
        Err(e) => {
            tracing::error!(error = %e, "scoring model unavailable; /analyze and /run-simulation will fail");
            std::sync::Arc::new(UnavailableScorer::new(e.to_string()))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
