// HTTP surface over the decision service
// Routes:
//   POST /analyze          score, decide, audit
//   GET  /audit-summary    summary + most recent records (alias: /logs)
//   GET  /search?query=    substring search over the ledger
//   GET  /metrics          model evaluation stats
//   GET  /run-simulation   rule vs utility backtest
//   GET  /health

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServiceConfig;
use crate::decision::{Decision, DecisionEngine, LoanApplication};
use crate::error::LendingError;
use crate::history::load_sample;
use crate::ledger::{AuditLedger, DecisionRecord};
use crate::metrics::ModelMetrics;
use crate::query::QueryService;
use crate::scoring::ScoringAdapter;
use crate::service::{DecisionResult, LendingService};
use crate::simulation::{BenchmarkPolicy, SimulationBenchmark, SimulationResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    service: LendingService,
    query: QueryService,
    benchmark: Arc<SimulationBenchmark>,
    sample_path: PathBuf,
    sample_size: usize,
    metrics_path: PathBuf,
    scoring_timeout: Duration,
}

impl AppState {
    pub fn new(config: &ServiceConfig, scorer: Arc<dyn ScoringAdapter>, ledger: Arc<AuditLedger>) -> Self {
        let engine = DecisionEngine::with_interest_rate(Arc::clone(&scorer), config.policy.interest_rate);
        let policy = BenchmarkPolicy {
            interest_rate: config.policy.interest_rate,
            risk_aversion: config.simulation.risk_aversion,
            fico_threshold: config.simulation.fico_threshold,
        };

        AppState {
            service: LendingService::new(engine, Arc::clone(&ledger)),
            query: QueryService::with_page_size(ledger, config.audit.page_size),
            benchmark: Arc::new(
                SimulationBenchmark::new(scorer, policy)
                    .with_scoring_timeout(Duration::from_millis(config.model.timeout_ms)),
            ),
            sample_path: config.simulation.sample_path.clone(),
            sample_size: config.simulation.sample_size,
            metrics_path: config.model.metrics_path.clone(),
            scoring_timeout: Duration::from_millis(config.model.timeout_ms),
        }
    }
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub income: f64,
    pub fico: f64,
    pub dti: f64,
    pub loan_amnt: f64,
    pub risk_lambda: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub record_id: i64,
    pub decision: Decision,
    pub utility_score: f64,
    pub risk_percentage: String,
    #[serde(rename = "probabilityOfDefault")]
    pub probability_of_default: f64,
    #[serde(rename = "riskAversion")]
    pub risk_aversion: f64,
    pub summary: String,
}

impl From<DecisionResult> for AnalyzeResponse {
    fn from(result: DecisionResult) -> Self {
        let pct = result.probability_of_default * 100.0;
        Self {
            record_id: result.record_id,
            decision: result.decision,
            utility_score: round_to(result.expected_utility, 2),
            risk_percentage: format!("{pct:.1}"),
            probability_of_default: round_to(pct, 1),
            risk_aversion: result.risk_aversion,
            summary: result.summary,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditSummaryResponse {
    pub total: u64,
    pub approval_rate: f64,
    pub avg_utility: f64,
    pub logs: Vec<DecisionRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub rule_based_profit: f64,
    pub ai_utility_profit: f64,
    pub improvement: String,
    pub sample_size: usize,
    pub rule_based_selected: usize,
    pub ai_selected: usize,
    pub risk_aversion: f64,
}

impl From<SimulationResult> for SimulationResponse {
    fn from(result: SimulationResult) -> Self {
        Self {
            rule_based_profit: round_to(result.rule_based_profit, 2),
            ai_utility_profit: round_to(result.ai_utility_profit, 2),
            improvement: format!("{:.1}%", result.improvement_percent),
            sample_size: result.sample_size,
            rule_based_selected: result.rule_based_selected,
            ai_selected: result.ai_selected,
            risk_aversion: result.risk_aversion,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    records: u64,
}

/// Presentation rounding only; the ledger keeps full precision.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError(LendingError);

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError(err)
    }
}

// Malformed bodies and query strings get the same JSON error shape as
// validation failures instead of axum's plain-text rejection.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(LendingError::invalid("request", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(LendingError::invalid("query", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LendingError::InvalidApplication { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LendingError::InsufficientSample { .. } => StatusCode::BAD_REQUEST,
            e if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::warn!(code = self.0.code(), error = %self.0, "request failed");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

fn join_error(err: tokio::task::JoinError) -> LendingError {
    LendingError::persistence("worker", err)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /analyze - Score, decide, and audit one application
async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Json(req) = payload?;
    let application = LoanApplication::new(req.income, req.fico, req.dti, req.loan_amnt, req.risk_lambda)?;

    let engine = state.service.engine().clone();
    let scoring = tokio::task::spawn_blocking(move || engine.decide(&application));
    let assessment = match tokio::time::timeout(state.scoring_timeout, scoring).await {
        Ok(Ok(decided)) => decided?,
        Ok(Err(e)) => return Err(LendingError::scoring(format!("scoring worker failed: {e}")).into()),
        Err(_) => {
            return Err(LendingError::scoring(format!(
                "scoring timed out after {} ms",
                state.scoring_timeout.as_millis()
            ))
            .into())
        }
    };

    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || service.record(&application, &assessment))
        .await
        .map_err(join_error)??;

    Ok(Json(result.into()))
}

/// GET /audit-summary - Summary and the most recent records
async fn audit_summary(State(state): State<AppState>) -> Result<Json<AuditSummaryResponse>, ApiError> {
    let query = state.query.clone();
    let overview = tokio::task::spawn_blocking(move || query.overview())
        .await
        .map_err(join_error)??;

    Ok(Json(AuditSummaryResponse {
        total: overview.summary.total,
        approval_rate: round_to(overview.summary.approval_rate, 1),
        avg_utility: round_to(overview.summary.average_utility, 2),
        logs: overview.logs,
    }))
}

/// GET /search?query= - Records whose fico, decision, or timestamp contain the query
async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<DecisionRecord>>, ApiError> {
    let Query(params) = params?;
    let query = state.query.clone();
    let records = tokio::task::spawn_blocking(move || query.search(&params.query))
        .await
        .map_err(join_error)??;

    Ok(Json(records))
}

/// GET /metrics - Model evaluation stats
async fn metrics(State(state): State<AppState>) -> Result<Json<ModelMetrics>, ApiError> {
    let path = state.metrics_path.clone();
    let metrics = tokio::task::spawn_blocking(move || ModelMetrics::load_or_fallback(&path))
        .await
        .map_err(join_error)?;

    Ok(Json(metrics))
}

/// GET /run-simulation - Backtest rule-based vs utility-based lending
async fn run_simulation(State(state): State<AppState>) -> Result<Json<SimulationResponse>, ApiError> {
    let benchmark = Arc::clone(&state.benchmark);
    let sample_path = state.sample_path.clone();
    let sample_size = state.sample_size;

    let budget = benchmark.time_budget(sample_size);

    let worker = tokio::task::spawn_blocking(move || {
        let corpus = load_sample(&sample_path)?;
        benchmark.run(&corpus, sample_size)
    });

    // the worker checks the same budget between rows; this bounds the
    // response even when a single scoring call hangs
    let joined = match budget {
        Some(budget) => tokio::time::timeout(budget, worker).await.map_err(|_| {
            LendingError::scoring(format!("backtest timed out after {} ms", budget.as_millis()))
        })?,
        None => worker.await,
    };
    let result = joined.map_err(|e| LendingError::simulation(format!("simulation worker failed: {e}")))??;

    Ok(Json(result.into()))
}

/// GET /health - Liveness plus ledger size
async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let ledger = Arc::clone(state.service.ledger());
    let records = tokio::task::spawn_blocking(move || ledger.count())
        .await
        .map_err(join_error)??;

    Ok(Json(HealthResponse {
        status: "ok",
        records,
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/audit-summary", get(audit_summary))
        .route("/logs", get(audit_summary))
        .route("/search", get(search))
        .route("/metrics", get(metrics))
        .route("/run-simulation", get(run_simulation))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}
