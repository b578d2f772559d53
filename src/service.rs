//! Decide-then-audit composition.
//!
//! A decision only leaves this module once its audit entry is committed.
//! If the ledger write fails the computed decision is dropped and the caller
//! sees `Persistence`.

use std::sync::Arc;

use serde::Serialize;

use crate::decision::{Assessment, Decision, DecisionEngine, LoanApplication};
use crate::error::Result;
use crate::ledger::{AuditLedger, DecisionEntry};

/// What the caller gets back for one application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionResult {
    pub record_id: i64,
    pub decision: Decision,
    pub expected_utility: f64,
    pub probability_of_default: f64,
    pub risk_aversion: f64,
    pub summary: String,
}

#[derive(Clone)]
pub struct LendingService {
    engine: DecisionEngine,
    ledger: Arc<AuditLedger>,
}

impl LendingService {
    pub fn new(engine: DecisionEngine, ledger: Arc<AuditLedger>) -> Self {
        LendingService { engine, ledger }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn analyze(&self, application: &LoanApplication) -> Result<DecisionResult> {
        let assessment = self.engine.decide(application)?;
        self.record(application, &assessment)
    }

    /// Audit an assessment and build the response. Split out so the HTTP
    /// layer can bound the scoring step with a timeout on its own.
    pub fn record(&self, application: &LoanApplication, assessment: &Assessment) -> Result<DecisionResult> {
        let entry = DecisionEntry::from_assessment(application, assessment);

        let record_id = match self.ledger.append(&entry) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, decision = %assessment.decision, "audit write failed, decision discarded");
                return Err(e);
            }
        };

        tracing::info!(
            record_id,
            decision = %assessment.decision,
            utility = assessment.expected_utility,
            p_default = assessment.probability_of_default,
            risk_aversion = application.risk_aversion(),
            "decision recorded"
        );

        Ok(DecisionResult {
            record_id,
            decision: assessment.decision,
            expected_utility: assessment.expected_utility,
            probability_of_default: assessment.probability_of_default,
            risk_aversion: application.risk_aversion(),
            summary: rationale(assessment),
        })
    }
}

/// One-line explanation shown next to the decision.
pub fn rationale(assessment: &Assessment) -> String {
    let reason = match assessment.decision {
        Decision::Approve => "Profit outweighs risk",
        Decision::Reject => "Risk too high",
    };
    format!("Utility: {:.2}. {reason}.", assessment.expected_utility)
}
