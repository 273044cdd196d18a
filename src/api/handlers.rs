//! API request handlers
//!
//! Handlers for all REST API endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::server::AppState;
use crate::core::{evaluate_formula, invert_formula, FeedbackReport, Formula, Outcome, Scorer};
use crate::error::KbError;
use crate::ingest::{self, IngestReport, Records};
use crate::oracle::OracleError;
use crate::types::{ConversionRelation, TestCase, TestRunnerOutput, UnitPair};

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// A failed request, rendered as an error envelope with a matching status
pub struct ApiError(KbError);

impl<E: Into<KbError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            err if err.is_contract_violation() => StatusCode::BAD_GATEWAY,
            KbError::Oracle(OracleError::Unsupported(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            KbError::Oracle(_) => StatusCode::BAD_GATEWAY,
            KbError::Formula(_) | KbError::Validation(_) | KbError::Json(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(path: &str, method: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Unitforge API Server".to_string(),
        version: state.version.clone(),
        description: "Self-improving knowledge base of unit conversions".to_string(),
        endpoints: vec![
            endpoint("/health", "GET", "Health check endpoint"),
            endpoint("/version", "GET", "Get server version"),
            endpoint("/api/v1/ask", "POST", "Answer a conversion question"),
            endpoint("/api/v1/lookup", "POST", "Look up a stored conversion"),
            endpoint("/api/v1/evaluate", "POST", "Evaluate a formula"),
            endpoint("/api/v1/invert", "POST", "Solve a formula for its input"),
            endpoint("/api/v1/score", "POST", "Score a formula against test cases"),
            endpoint("/api/v1/ingest", "POST", "Store a batch of known conversions"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub conversions: usize,
}

/// GET /health - Health check
pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let conversions = state.agent.gateway().conversions()?.len();
    Ok(Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        conversions,
    })))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: ["ask", "lookup", "evaluate", "invert", "score", "ingest"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }))
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// POST /api/v1/ask - Resolve a question through the acquisition loop
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> ApiResult<AskResponse> {
    let outcome = state.agent.ask(&req.question).await?;
    Ok(Json(ApiResponse::ok(AskResponse {
        message: outcome.to_string(),
        outcome,
    })))
}

#[derive(Deserialize)]
pub struct LookupRequest {
    pub from_unit: String,
    pub to_unit: String,
}

#[derive(Serialize)]
pub struct LookupResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ConversionRelation>,
}

/// POST /api/v1/lookup - Stored formula for a pair, if any
pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LookupRequest>,
) -> ApiResult<LookupResponse> {
    let pair = UnitPair::new(&req.from_unit, &req.to_unit)
        .map_err(|e| KbError::Validation(e.to_string()))?;
    let conversion = state.agent.gateway().lookup_relation(&pair)?;
    Ok(Json(ApiResponse::ok(LookupResponse {
        found: conversion.is_some(),
        conversion,
    })))
}

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub formula: String,
    pub value: f64,
    /// Defaults to the formula's only input
    #[serde(default)]
    pub variable: Option<String>,
}

#[derive(Serialize)]
pub struct EvaluateResponse {
    pub formula: String,
    pub variable: String,
    pub value: f64,
    pub result: f64,
}

/// POST /api/v1/evaluate - Evaluate a formula at one value
pub async fn evaluate(Json(req): Json<EvaluateRequest>) -> ApiResult<EvaluateResponse> {
    let variable = match req.variable {
        Some(variable) => variable,
        None => Formula::parse(&req.formula)?.input().to_string(),
    };
    let result = evaluate_formula(&req.formula, &variable, req.value)?;
    Ok(Json(ApiResponse::ok(EvaluateResponse {
        formula: req.formula,
        variable,
        value: req.value,
        result,
    })))
}

#[derive(Deserialize)]
pub struct InvertRequest {
    pub formula: String,
}

#[derive(Serialize)]
pub struct InvertResponse {
    pub formula: String,
    pub inverse: String,
}

/// POST /api/v1/invert - Solve a formula for its input
pub async fn invert(Json(req): Json<InvertRequest>) -> ApiResult<InvertResponse> {
    let inverse = invert_formula(&req.formula)?;
    Ok(Json(ApiResponse::ok(InvertResponse {
        formula: req.formula,
        inverse,
    })))
}

#[derive(Deserialize)]
pub struct ScoreRequest {
    pub formula: String,
    pub test_cases: Vec<TestCase>,
}

#[derive(Serialize)]
pub struct ScoreResponse {
    pub accepted: bool,
    #[serde(flatten)]
    pub output: TestRunnerOutput,
    /// Correction feedback, present when the formula was not accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// POST /api/v1/score - Score a formula with the server's tolerance and threshold
pub async fn score(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScoreRequest>,
) -> ApiResult<ScoreResponse> {
    let config = state.agent.config();
    let output = Scorer::new(config.tolerance).score(&req.formula, &req.test_cases)?;
    let accepted = output.score >= config.acceptance_threshold;
    let feedback =
        (!accepted).then(|| FeedbackReport::new(req.formula.as_str(), output.clone()).to_string());
    Ok(Json(ApiResponse::ok(ScoreResponse {
        accepted,
        output,
        feedback,
    })))
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub records: Records,
    #[serde(default)]
    pub concurrent: bool,
}

/// POST /api/v1/ingest - Store a batch of records
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<IngestReport> {
    let gateway = state.agent.gateway().clone();
    let report = if req.concurrent {
        ingest::ingest_records_concurrent(&gateway, req.records).await
    } else {
        tokio::task::spawn_blocking(move || ingest::ingest_records(&gateway, req.records))
            .await?
    };
    Ok(Json(ApiResponse::ok(report)))
}
