// Simulation Benchmark - backtest of two lending policies
//
// Over a random draw from the historical corpus:
//   rule-based:  lend iff fico >= threshold
//   utility:     lend iff expected_utility(p_default, loan, r, lambda) > 0
// Each policy earns the realized profit of the loans it selected.
//
// lambda here is a portfolio-level constant from configuration. The live
// /analyze path prices with the caller's lambda instead; the two are kept
// separate on purpose and every result reports the lambda it used.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::index;
use rand::Rng;
use serde::Serialize;

use crate::decision::{expected_utility, score_checked, DEFAULT_INTEREST_RATE};
use crate::error::{LendingError, Result};
use crate::history::HistoricalApplication;
use crate::scoring::ScoringAdapter;

/// Fixed parameters of one backtest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BenchmarkPolicy {
    pub interest_rate: f64,
    pub risk_aversion: f64,
    pub fico_threshold: f64,
}

impl Default for BenchmarkPolicy {
    fn default() -> Self {
        BenchmarkPolicy {
            interest_rate: DEFAULT_INTEREST_RATE,
            risk_aversion: 1.5,
            fico_threshold: 640.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationResult {
    pub rule_based_profit: f64,
    pub ai_utility_profit: f64,
    /// `100 * (ai - rule) / |rule|`, or 0 when the rule policy nets exactly 0.
    pub improvement_percent: f64,
    pub sample_size: usize,
    pub rule_based_selected: usize,
    pub ai_selected: usize,
    pub risk_aversion: f64,
}

pub struct SimulationBenchmark {
    scorer: Arc<dyn ScoringAdapter>,
    policy: BenchmarkPolicy,
    scoring_timeout: Option<Duration>,
}

impl SimulationBenchmark {
    pub fn new(scorer: Arc<dyn ScoringAdapter>, policy: BenchmarkPolicy) -> Self {
        SimulationBenchmark {
            scorer,
            policy,
            scoring_timeout: None,
        }
    }

    /// Bound every run by `timeout` per scored row. A run that overshoots
    /// its budget stops at the next row with `ScoringUnavailable`.
    pub fn with_scoring_timeout(mut self, timeout: Duration) -> Self {
        self.scoring_timeout = Some(timeout);
        self
    }

    /// Wall-clock budget for scoring `rows` rows (never less than one
    /// timeout), if a timeout is set.
    pub fn time_budget(&self, rows: usize) -> Option<Duration> {
        let rows = u32::try_from(rows.max(1)).unwrap_or(u32::MAX);
        self.scoring_timeout.map(|t| t.saturating_mul(rows))
    }

    pub fn policy(&self) -> BenchmarkPolicy {
        self.policy
    }

    /// Draw `sample_size` rows without replacement using the thread RNG.
    pub fn run(&self, corpus: &[HistoricalApplication], sample_size: usize) -> Result<SimulationResult> {
        self.run_with_rng(corpus, sample_size, &mut rand::rng())
    }

    /// Same as `run` with a caller-supplied RNG, for reproducible backtests.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        corpus: &[HistoricalApplication],
        sample_size: usize,
        rng: &mut R,
    ) -> Result<SimulationResult> {
        if corpus.len() < sample_size {
            return Err(LendingError::InsufficientSample {
                requested: sample_size,
                available: corpus.len(),
            });
        }

        let batch: Vec<HistoricalApplication> = index::sample(rng, corpus.len(), sample_size)
            .into_iter()
            .map(|i| corpus[i])
            .collect();

        self.evaluate(&batch)
    }

    /// Apply both policies to an already drawn batch. Any scoring failure
    /// aborts the whole run; there is no partial result.
    pub fn evaluate(&self, batch: &[HistoricalApplication]) -> Result<SimulationResult> {
        let policy = self.policy;
        let started = Instant::now();
        let budget = self.time_budget(batch.len());

        let mut rule_profit = 0.0;
        let mut ai_profit = 0.0;
        let mut rule_selected = 0;
        let mut ai_selected = 0;

        for app in batch {
            let profit = app.realized_profit(policy.interest_rate);

            if app.fico >= policy.fico_threshold {
                rule_profit += profit;
                rule_selected += 1;
            }

            let p_default = score_checked(self.scorer.as_ref(), &app.features())
                .map_err(|e| LendingError::simulation(format!("scoring failed during backtest: {e}")))?;

            if let Some(budget) = budget {
                if started.elapsed() > budget {
                    return Err(LendingError::scoring(format!(
                        "backtest scoring exceeded {} ms for {} rows",
                        budget.as_millis(),
                        batch.len()
                    )));
                }
            }

            let utility = expected_utility(
                p_default,
                app.loan_amount,
                policy.interest_rate,
                policy.risk_aversion,
            );

            if utility > 0.0 {
                ai_profit += profit;
                ai_selected += 1;
            }
        }

        let result = SimulationResult {
            rule_based_profit: rule_profit,
            ai_utility_profit: ai_profit,
            improvement_percent: improvement_percent(rule_profit, ai_profit),
            sample_size: batch.len(),
            rule_based_selected: rule_selected,
            ai_selected,
            risk_aversion: policy.risk_aversion,
        };

        tracing::info!(
            sample_size = result.sample_size,
            rule_profit = result.rule_based_profit,
            ai_profit = result.ai_utility_profit,
            improvement = result.improvement_percent,
            risk_aversion = result.risk_aversion,
            "backtest complete"
        );

        Ok(result)
    }
}

pub fn improvement_percent(rule_profit: f64, ai_profit: f64) -> f64 {
    if rule_profit == 0.0 {
        0.0
    } else {
        (ai_profit - rule_profit) / rule_profit.abs() * 100.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
