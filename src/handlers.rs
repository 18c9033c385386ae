//! HTTP endpoints exposed by the gateway server.
//!
//! - `GET /tools/list` — public metadata for every registered tool
//! - `POST /tools/call` — invoke a tool, optionally with a payment proof
//! - `GET /healthz` — liveness probe
//!
//! Payloads are structured JSON. Failures come back as `{kind, message,
//! details?}` with a status class the caller can act on: 402 for payment
//! rejections (retry with a corrected or fresh proof), 503 when the settlement
//! collaborator could not be reached (retry the same proof later), 400/404/500
//! for caller and handler errors. A 402 response carries the gateway's payment
//! terms in `details.accepts` so clients can construct a valid proof.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

use crate::gateway::{GatewayError, InvocationGateway};
use crate::registry::{RegistryError, ToolMetadata};
use crate::settlement::SettlementLedger;
use crate::types::{PaymentPolicy, PaymentProof};
use crate::verifier::PaymentError;

/// Request body for `POST /tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentProof>,
}

/// Response body for `GET /tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub tools: Vec<ToolMetadata>,
}

/// Structured error body for failed calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Builds the gateway's route set, to be attached to an axum server with an
/// `Arc<InvocationGateway>` as state.
pub fn routes<L>() -> Router<Arc<InvocationGateway<L>>>
where
    L: SettlementLedger + Send + Sync + 'static,
{
    Router::new()
        .route("/tools/list", get(get_tools_list::<L>))
        .route("/tools/call", post(post_tools_call::<L>))
        .route("/healthz", get(get_healthz))
}

/// `GET /healthz`: liveness probe.
async fn get_healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /tools/list`: public metadata for all registered tools, in
/// registration order. Handler internals are never exposed.
#[instrument(skip_all)]
async fn get_tools_list<L>(
    State(gateway): State<Arc<InvocationGateway<L>>>,
) -> impl IntoResponse
where
    L: SettlementLedger + Send + Sync + 'static,
{
    Json(ListResponse {
        tools: gateway.list_tools(),
    })
}

/// `POST /tools/call`: invokes a tool by name.
///
/// Responds with the handler's JSON output on success, or an [`ErrorBody`]
/// describing the failure. Payment is checked only when the gateway's policy
/// is enabled.
#[instrument(skip_all, fields(tool = %body.name))]
async fn post_tools_call<L>(
    State(gateway): State<Arc<InvocationGateway<L>>>,
    Json(body): Json<CallRequest>,
) -> Response
where
    L: SettlementLedger + Send + Sync + 'static,
{
    match gateway
        .handle_call(&body.name, body.input, body.payment.as_ref())
        .await
    {
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, tool = %body.name, "tool call failed");
            error_response(&error, gateway.policy())
        }
    }
}

/// Maps a gateway error onto a status code and wire error body.
fn error_response(error: &GatewayError, policy: &PaymentPolicy) -> Response {
    let status = match error {
        GatewayError::Registry(RegistryError::ToolNotFound(_)) => StatusCode::NOT_FOUND,
        GatewayError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        GatewayError::Payment(PaymentError::CollaboratorUnavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GatewayError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
        GatewayError::ToolExecution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let details = match error {
        // Give payment-rejected callers the terms they must meet.
        GatewayError::Payment(payment_error) if !payment_error.is_transient() => {
            Some(json!({ "accepts": policy }))
        }
        _ => None,
    };
    let body = ErrorBody {
        kind: error_kind(error).to_string(),
        message: error.to_string(),
        details,
    };
    (status, Json(body)).into_response()
}

/// Stable machine-readable error kinds, part of the wire contract.
fn error_kind(error: &GatewayError) -> &'static str {
    match error {
        GatewayError::Registry(RegistryError::DuplicateToolName(_)) => "duplicate_tool_name",
        GatewayError::Registry(RegistryError::ToolNotFound(_)) => "tool_not_found",
        GatewayError::Registry(RegistryError::InvalidSchema { .. }) => "invalid_schema",
        GatewayError::InvalidInput { .. } => "invalid_input",
        GatewayError::Payment(PaymentError::MissingProof) => "missing_proof",
        GatewayError::Payment(PaymentError::AssetMismatch { .. }) => "asset_mismatch",
        GatewayError::Payment(PaymentError::NetworkMismatch { .. }) => "network_mismatch",
        GatewayError::Payment(PaymentError::InsufficientAmount { .. }) => "insufficient_amount",
        GatewayError::Payment(PaymentError::RecipientMismatch { .. }) => "recipient_mismatch",
        GatewayError::Payment(PaymentError::ReplayedSettlement(_)) => "replayed_settlement",
        GatewayError::Payment(PaymentError::SettlementNotFound(_)) => "settlement_not_found",
        GatewayError::Payment(PaymentError::SettlementPending(_)) => "settlement_pending",
        GatewayError::Payment(PaymentError::SettlementFailed(_)) => "settlement_failed",
        GatewayError::Payment(PaymentError::CollaboratorUnavailable(_)) => {
            "settlement_unavailable"
        }
        GatewayError::ToolExecution { .. } => "tool_execution_error",
    }
}
