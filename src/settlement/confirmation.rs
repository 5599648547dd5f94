use std::sync::Arc;

use super::models::{ConfirmationAck, ConfirmationOutcome};
use super::service::SettlementEngine;
use crate::error::SettlementError;

pub const CONFIRMED_CODE: &str = "00";
pub const NOT_CONFIRMED_CODE: &str = "99";

/// What a second callback for an already resolved job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReentry {
    /// Same code returns the original acknowledgement, a different one conflicts.
    Idempotent,
    /// Any repeat callback conflicts.
    Reject,
}

/// HTTP status class reported when a callback names an unknown protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownProtocolStatus {
    NotFound,
    BadRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub reentry: ConfirmationReentry,
    pub unknown_protocol: UnknownProtocolStatus,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            reentry: ConfirmationReentry::Idempotent,
            unknown_protocol: UnknownProtocolStatus::NotFound,
        }
    }
}

/// key: settlement-confirmation -> authority callback correlation
#[derive(Clone)]
pub struct ConfirmationIntake {
    engine: Arc<SettlementEngine>,
    policy: ConfirmationPolicy,
}

impl ConfirmationIntake {
    pub fn new(engine: Arc<SettlementEngine>, policy: ConfirmationPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    pub fn confirm(
        &self,
        protocol_number: &str,
        confirmation_code: &str,
    ) -> Result<ConfirmationAck, SettlementError> {
        let protocol_number = protocol_number.trim();
        let confirmation_code = confirmation_code.trim();
        if protocol_number.is_empty() {
            return Err(SettlementError::MissingField("protocol_number"));
        }
        if confirmation_code.is_empty() {
            return Err(SettlementError::MissingField("confirmation_code"));
        }
        if !self.engine.has_protocol(protocol_number) {
            return Err(SettlementError::ProtocolNotFound(protocol_number.to_string()));
        }
        let outcome = parse_confirmation_code(confirmation_code)?;

        let result = self.engine.apply_confirmation(
            protocol_number,
            outcome,
            confirmation_code,
            self.policy.reentry,
        );
        match &result {
            Ok(ack) => tracing::info!(
                protocol = %protocol_number,
                code = %confirmation_code,
                outcome = ?ack.outcome,
                "settlement confirmation applied"
            ),
            Err(err) => tracing::warn!(
                protocol = %protocol_number,
                code = %confirmation_code,
                %err,
                "settlement confirmation refused"
            ),
        }
        result
    }
}

pub fn parse_confirmation_code(code: &str) -> Result<ConfirmationOutcome, SettlementError> {
    match code {
        CONFIRMED_CODE => Ok(ConfirmationOutcome::Confirmed),
        NOT_CONFIRMED_CODE => Ok(ConfirmationOutcome::NotConfirmed),
        other => Err(SettlementError::InvalidConfirmationCode(other.to_string())),
    }
}
