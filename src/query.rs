//! Read-side composition over the audit ledger.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::ledger::{AuditLedger, AuditSummary, DecisionRecord};

/// Default number of records shown next to the summary.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Summary plus the most recent page of records.
#[derive(Debug, Clone, Serialize)]
pub struct AuditOverview {
    pub summary: AuditSummary,
    pub logs: Vec<DecisionRecord>,
}

#[derive(Clone)]
pub struct QueryService {
    ledger: Arc<AuditLedger>,
    page_size: usize,
}

impl QueryService {
    pub fn new(ledger: Arc<AuditLedger>) -> Self {
        Self::with_page_size(ledger, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(ledger: Arc<AuditLedger>, page_size: usize) -> Self {
        QueryService { ledger, page_size }
    }

    pub fn overview(&self) -> Result<AuditOverview> {
        let (summary, logs) = self.ledger.snapshot(self.page_size)?;
        Ok(AuditOverview { summary, logs })
    }

    pub fn search(&self, pattern: &str) -> Result<Vec<DecisionRecord>> {
        self.ledger.search(pattern)
    }
}
