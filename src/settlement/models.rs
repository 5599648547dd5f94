use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// key: settlement-initiation-code -> one-time workflow gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitiationCode {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Registered,
    Confirmed,
    NotConfirmed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Registered => "Registered",
            JobStatus::Confirmed => "Confirmed",
            JobStatus::NotConfirmed => "NotConfirmed",
            JobStatus::Error => "Error",
        }
    }

    /// States in which the authority has issued a protocol number.
    pub fn carries_protocol(&self) -> bool {
        matches!(
            self,
            JobStatus::Registered | JobStatus::Confirmed | JobStatus::NotConfirmed
        )
    }
}

/// How `start` identifies the boleto being settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Barcode(String),
    DocumentId(String),
}

/// key: settlement-job -> asynchronous registration unit
#[derive(Debug, Clone)]
pub struct SettlementJob {
    pub initiation_code: String,
    pub document_id: String,
    pub barcode: String,
    pub outbound_payload: Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub protocol_number: Option<String>,
    pub provider_response: Option<Value>,
    pub confirmation_code: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementJob {
    pub fn pending(
        initiation_code: String,
        document_id: String,
        barcode: String,
        outbound_payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            initiation_code,
            document_id,
            barcode,
            outbound_payload,
            status: JobStatus::Pending,
            created_at: now,
            registered_at: None,
            confirmed_at: None,
            protocol_number: None,
            provider_response: None,
            confirmation_code: None,
            last_error: None,
            updated_at: now,
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            initiation_code: self.initiation_code.clone(),
            status: self.status,
            document_id: self.document_id.clone(),
            barcode: self.barcode.clone(),
            created_at: self.created_at,
            registered_at: self.registered_at,
            confirmed_at: self.confirmed_at,
            protocol_number: self.protocol_number.clone(),
            confirmation_code: self.confirmation_code.clone(),
            error: self.last_error.clone(),
        }
    }
}

/// Snapshot returned by status polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub initiation_code: String,
    pub status: JobStatus,
    pub document_id: String,
    pub barcode: String,
    pub created_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub protocol_number: Option<String>,
    pub confirmation_code: Option<String>,
    pub error: Option<String>,
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartedJob {
    pub initiation_code: String,
    pub status: JobStatus,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfirmationOutcome {
    Confirmed,
    NotConfirmed,
}

/// Acknowledgement handed back to the settlement authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationAck {
    pub outcome: ConfirmationOutcome,
    pub protocol_number: String,
    pub token: String,
}

impl ConfirmationAck {
    pub fn new(outcome: ConfirmationOutcome, protocol_number: &str) -> Self {
        let label = match outcome {
            ConfirmationOutcome::Confirmed => "CONFIRMED",
            ConfirmationOutcome::NotConfirmed => "NOT-CONFIRMED",
        };
        Self {
            outcome,
            protocol_number: protocol_number.to_string(),
            token: format!("ACK-{label}-{protocol_number}"),
        }
    }
}
