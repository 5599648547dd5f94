use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::confirmation::{ConfirmationIntake, UnknownProtocolStatus};
use super::models::{ConfirmationAck, JobStatus, JobView, RecordKey};
use super::service::SettlementEngine;
use crate::error::{AppError, AppResult, CallbackError, SettlementError};

#[derive(Debug, Serialize)]
pub struct IssueCodeResponse {
    pub success: bool,
    pub message: String,
    pub initiation_code: String,
    pub issued_at: DateTime<Utc>,
}

/// key: settlement-api -> rest endpoints
pub async fn issue_code(
    Extension(engine): Extension<Arc<SettlementEngine>>,
) -> Json<IssueCodeResponse> {
    let issued = engine.issue_code();
    Json(IssueCodeResponse {
        success: true,
        message: "initiation code issued".into(),
        initiation_code: issued.code,
        issued_at: issued.issued_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default, alias = "codigo_inicial")]
    pub initiation_code: String,
    #[serde(default, alias = "codigo_barras")]
    pub barcode: Option<String>,
    #[serde(default, alias = "codigo_boleto")]
    pub document_id: Option<String>,
}

impl StartRequest {
    fn record_key(&self) -> RecordKey {
        match (&self.barcode, &self.document_id) {
            (Some(barcode), _) if !barcode.trim().is_empty() => RecordKey::Barcode(barcode.clone()),
            (_, Some(document_id)) if !document_id.trim().is_empty() => {
                RecordKey::DocumentId(document_id.clone())
            }
            (None, Some(document_id)) => RecordKey::DocumentId(document_id.clone()),
            _ => RecordKey::Barcode(String::new()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: String,
    pub initiation_code: String,
    pub status: JobStatus,
    pub payload: Value,
}

pub async fn start_settlement(
    Extension(engine): Extension<Arc<SettlementEngine>>,
    Json(request): Json<StartRequest>,
) -> AppResult<Json<StartResponse>> {
    let started = engine
        .start(&request.initiation_code, request.record_key())
        .await?;
    Ok(Json(StartResponse {
        success: true,
        message: "settlement started; registration in progress".into(),
        initiation_code: started.initiation_code,
        status: started.status,
        payload: started.payload,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub job: JobView,
}

pub async fn settlement_status(
    Extension(engine): Extension<Arc<SettlementEngine>>,
    Path(initiation_code): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    let job = engine.status(&initiation_code)?;
    Ok(Json(StatusResponse {
        success: true,
        message: format!("settlement is {}", job.status.as_str()),
        job,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default, alias = "numeroProtocolo")]
    pub protocol_number: String,
    #[serde(default, alias = "codigoConfirmacao")]
    pub confirmation_code: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    /// Receipt code the authority expects on a processed callback.
    #[serde(rename = "codigo")]
    pub receipt: &'static str,
    pub ack: ConfirmationAck,
}

fn apply_confirmation(
    intake: &ConfirmationIntake,
    request: &ConfirmRequest,
) -> AppResult<ConfirmResponse> {
    let ack = intake
        .confirm(&request.protocol_number, &request.confirmation_code)
        .map_err(|err| match err {
            SettlementError::ProtocolNotFound(_)
                if intake.policy().unknown_protocol == UnknownProtocolStatus::BadRequest =>
            {
                AppError::BadRequest(err.to_string())
            }
            other => other.into(),
        })?;
    Ok(ConfirmResponse {
        success: true,
        message: "confirmation recorded".into(),
        receipt: "00",
        ack,
    })
}

pub async fn confirm_settlement(
    Extension(intake): Extension<ConfirmationIntake>,
    Json(request): Json<ConfirmRequest>,
) -> AppResult<Json<ConfirmResponse>> {
    apply_confirmation(&intake, &request).map(Json)
}

/// Callback entry point used by the settlement authority. Unreadable bodies
/// are answered in the same receipt shape as every other refusal.
pub async fn confirm_callback(
    Extension(intake): Extension<ConfirmationIntake>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<ConfirmResponse>, CallbackError> {
    let Json(request) = body.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    Ok(Json(apply_confirmation(&intake, &request)?))
}
