// Decision Engine - expected-utility lending decisions
//
// Utility of lending to one applicant:
//   EU = (1 - p_default) * loan * r  -  p_default * loan * lambda
//
// APPROVE iff EU > 0. EU == 0 is REJECT.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LendingError, Result};
use crate::scoring::{ApplicantFeatures, ScoringAdapter};

/// Interest earned on a repaid loan, as a fraction of principal.
pub const DEFAULT_INTEREST_RATE: f64 = 0.15;

pub const MIN_FICO: f64 = 300.0;
pub const MAX_FICO: f64 = 850.0;

// ============================================================================
// LOAN APPLICATION
// ============================================================================

/// One validated request. Fields are private so an instance can only exist
/// once every bound has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoanApplication {
    income: f64,
    fico: f64,
    debt_to_income: f64,
    loan_amount: f64,
    risk_aversion: f64,
}

impl LoanApplication {
    pub fn new(
        income: f64,
        fico: f64,
        debt_to_income: f64,
        loan_amount: f64,
        risk_aversion: f64,
    ) -> Result<Self> {
        let fields = [
            ("income", income),
            ("fico", fico),
            ("dti", debt_to_income),
            ("loan_amnt", loan_amount),
            ("risk_lambda", risk_aversion),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(LendingError::invalid(field, "must be a finite number"));
            }
        }

        if income <= 0.0 {
            return Err(LendingError::invalid("income", "must be greater than 0"));
        }
        if !(MIN_FICO..=MAX_FICO).contains(&fico) {
            return Err(LendingError::invalid(
                "fico",
                format!("must be within [{MIN_FICO}, {MAX_FICO}], got {fico}"),
            ));
        }
        if debt_to_income < 0.0 {
            return Err(LendingError::invalid("dti", "must not be negative"));
        }
        if loan_amount <= 0.0 {
            return Err(LendingError::invalid("loan_amnt", "must be greater than 0"));
        }
        if risk_aversion < 0.0 {
            return Err(LendingError::invalid("risk_lambda", "must not be negative"));
        }

        Ok(Self {
            income,
            fico,
            debt_to_income,
            loan_amount,
            risk_aversion,
        })
    }

    pub fn income(&self) -> f64 {
        self.income
    }

    pub fn fico(&self) -> f64 {
        self.fico
    }

    pub fn debt_to_income(&self) -> f64 {
        self.debt_to_income
    }

    pub fn loan_amount(&self) -> f64 {
        self.loan_amount
    }

    pub fn risk_aversion(&self) -> f64 {
        self.risk_aversion
    }

    pub fn features(&self) -> ApplicantFeatures {
        ApplicantFeatures {
            income: self.income,
            fico: self.fico,
            dti: self.debt_to_income,
            loan_amount: self.loan_amount,
        }
    }
}

// ============================================================================
// DECISION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Strict threshold: only a positive utility approves.
    pub fn from_utility(expected_utility: f64) -> Self {
        if expected_utility > 0.0 {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Reject => "REJECT",
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approve)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "APPROVE" => Ok(Decision::Approve),
            "REJECT" => Ok(Decision::Reject),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// Expected utility of lending `loan_amount` at `interest_rate` to an
/// applicant with default probability `p_default`, under loss aversion λ.
///
/// Shared by the live engine and the backtest so both price risk identically.
pub fn expected_utility(p_default: f64, loan_amount: f64, interest_rate: f64, risk_aversion: f64) -> f64 {
    let p_success = 1.0 - p_default;
    let gain = loan_amount * interest_rate;
    let loss = loan_amount;

    p_success * gain - p_default * loss * risk_aversion
}

/// Outcome of scoring and pricing one application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Assessment {
    pub probability_of_default: f64,
    pub expected_utility: f64,
    pub decision: Decision,
}

// ============================================================================
// DECISION ENGINE
// ============================================================================

/// Stateless; clone it freely across request handlers.
#[derive(Clone)]
pub struct DecisionEngine {
    scorer: Arc<dyn ScoringAdapter>,
    interest_rate: f64,
}

impl DecisionEngine {
    pub fn new(scorer: Arc<dyn ScoringAdapter>) -> Self {
        Self::with_interest_rate(scorer, DEFAULT_INTEREST_RATE)
    }

    pub fn with_interest_rate(scorer: Arc<dyn ScoringAdapter>, interest_rate: f64) -> Self {
        DecisionEngine {
            scorer,
            interest_rate,
        }
    }

    pub fn interest_rate(&self) -> f64 {
        self.interest_rate
    }

    pub fn scorer(&self) -> Arc<dyn ScoringAdapter> {
        Arc::clone(&self.scorer)
    }

    pub fn decide(&self, application: &LoanApplication) -> Result<Assessment> {
        let p_default = score_checked(self.scorer.as_ref(), &application.features())?;

        let utility = expected_utility(
            p_default,
            application.loan_amount(),
            self.interest_rate,
            application.risk_aversion(),
        );
        let decision = Decision::from_utility(utility);

        tracing::debug!(
            fico = application.fico(),
            loan_amount = application.loan_amount(),
            risk_aversion = application.risk_aversion(),
            p_default,
            utility,
            %decision,
            "application assessed"
        );

        Ok(Assessment {
            probability_of_default: p_default,
            expected_utility: utility,
            decision,
        })
    }
}

/// Call the adapter and reject anything that is not a probability.
pub(crate) fn score_checked(scorer: &dyn ScoringAdapter, features: &ApplicantFeatures) -> Result<f64> {
    let p = scorer.predict_default_probability(features)?;
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(LendingError::scoring(format!(
            "scorer returned {p}, expected a probability in [0, 1]"
        )));
    }
    Ok(p)
}

// ============================================================================
// TESTS
// ============================================================================
