//! Service configuration with layered resolution.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied by the binaries after `load`)
//! 2. Environment variables (`VANTAGE_*`, plus `FRONTEND_URL`)
//! 3. TOML file (explicit path, or `vantage.toml` in the working directory)
//! 4. Compiled defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LendingError, Result};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vantage.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub policy: PolicyConfig,
    pub simulation: SimulationConfig,
    pub audit: AuditConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/lending.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Serialized scaler + logistic coefficients produced by training.
    pub artifact_path: PathBuf,
    /// Evaluation stats written next to the artifact by training.
    pub metrics_path: PathBuf,
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("data/model.json"),
            metrics_path: PathBuf::from("data/model_stats.json"),
            timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Lender's gain on a repaid loan, as a fraction of principal.
    pub interest_rate: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { interest_rate: 0.15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub sample_path: PathBuf,
    pub sample_size: usize,
    /// Portfolio-level λ for the backtest. Independent of the per-request λ
    /// used on the live decision path.
    pub risk_aversion: f64,
    pub fico_threshold: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_path: PathBuf::from("data/lending_club_sample.csv"),
            sample_size: 100,
            risk_aversion: 1.5,
            fico_threshold: 640.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Records returned alongside the summary.
    pub page_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
        }
    }
}

impl ServiceConfig {
    /// Resolve defaults, the TOML file, and the process environment.
    ///
    /// An explicit `path` must exist; the implicit `vantage.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILE);
                if implicit.exists() {
                    Self::from_file(implicit)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LendingError::io(path, e))?;
        toml::from_str(&content).map_err(|e| LendingError::ConfigParse {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LendingError::ConfigParse {
            path: PathBuf::from("<string>"),
            details: e.to_string(),
        })
    }

    /// Apply `VANTAGE_*` overrides using `lookup` as the environment.
    /// Unparseable numeric values are ignored and logged.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VANTAGE_DB_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VANTAGE_MODEL_PATH") {
            self.model.artifact_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VANTAGE_METRICS_PATH") {
            self.model.metrics_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VANTAGE_SAMPLE_PATH") {
            self.simulation.sample_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VANTAGE_BIND") {
            self.server.bind_address = v;
        }
        if let Some(v) = lookup("VANTAGE_BENCHMARK_LAMBDA") {
            match v.parse::<f64>() {
                Ok(lambda) => self.simulation.risk_aversion = lambda,
                Err(_) => tracing::warn!(value = %v, "ignoring unparseable VANTAGE_BENCHMARK_LAMBDA"),
            }
        }
        if let Some(v) = lookup("VANTAGE_SCORING_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.model.timeout_ms = ms,
                Err(_) => tracing::warn!(value = %v, "ignoring unparseable VANTAGE_SCORING_TIMEOUT_MS"),
            }
        }
        if let Some(origin) = lookup("FRONTEND_URL") {
            if !self.server.allowed_origins.contains(&origin) {
                self.server.allowed_origins.push(origin);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let rate = self.policy.interest_rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(invalid(format!(
                "policy.interest_rate must be a positive number, got {rate}"
            )));
        }

        let lambda = self.simulation.risk_aversion;
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(invalid(format!(
                "simulation.risk_aversion must be >= 0, got {lambda}"
            )));
        }

        if !self.simulation.fico_threshold.is_finite() {
            return Err(invalid("simulation.fico_threshold must be finite"));
        }

        if self.simulation.sample_size == 0 {
            return Err(invalid("simulation.sample_size must be at least 1"));
        }

        if self.audit.page_size == 0 {
            return Err(invalid("audit.page_size must be at least 1"));
        }

        if self.model.timeout_ms == 0 {
            return Err(invalid("model.timeout_ms must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(details: impl Into<String>) -> LendingError {
    LendingError::InvalidConfig {
        details: details.into(),
    }
}
