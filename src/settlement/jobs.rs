use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use super::client::REFERENCE_SENTINEL;
use super::confirmation::ConfirmationReentry;
use super::models::{ConfirmationAck, ConfirmationOutcome, JobStatus, JobView, SettlementJob};
use crate::error::SettlementError;

/// key: settlement-job-table -> per-entry locked lifecycle state
///
/// `jobs` is keyed by initiation code; `protocols` maps an authority protocol
/// number back to its initiation code. Writers that touch both always lock
/// `jobs` first, and readers of `protocols` drop that guard before locking a
/// job, so the two maps never deadlock.
#[derive(Clone, Default)]
pub struct JobTable {
    jobs: Arc<DashMap<String, SettlementJob>>,
    protocols: Arc<DashMap<String, String>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_pending(&self, job: SettlementJob) -> bool {
        match self.jobs.entry(job.initiation_code.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(job);
                true
            }
        }
    }

    pub fn view(&self, initiation_code: &str) -> Option<JobView> {
        self.jobs.get(initiation_code).map(|job| job.view())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(crate) fn code_for_protocol(&self, protocol_number: &str) -> Option<String> {
        self.protocols
            .get(protocol_number)
            .map(|code| code.value().clone())
    }

    /// Pending -> Registered. Returns false when the job is gone or already left Pending.
    pub(crate) fn mark_registered(
        &self,
        initiation_code: &str,
        protocol_number: String,
        provider_response: Value,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(mut job) = self.jobs.get_mut(initiation_code) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        if protocol_number != REFERENCE_SENTINEL {
            match self.protocols.entry(protocol_number.clone()) {
                Entry::Occupied(existing) => {
                    tracing::warn!(
                        protocol = %protocol_number,
                        initiation_code = %initiation_code,
                        previous = %existing.get(),
                        "authority reused a protocol number; callback correlation keeps the first job"
                    );
                }
                Entry::Vacant(slot) => {
                    slot.insert(initiation_code.to_string());
                }
            }
        }
        job.status = JobStatus::Registered;
        job.protocol_number = Some(protocol_number);
        job.provider_response = Some(provider_response);
        job.registered_at = Some(now);
        job.updated_at = now;
        true
    }

    /// Pending -> Error.
    pub(crate) fn mark_failed(
        &self,
        initiation_code: &str,
        cause: String,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(mut job) = self.jobs.get_mut(initiation_code) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        job.status = JobStatus::Error;
        job.last_error = Some(cause);
        job.updated_at = now;
        true
    }

    /// Registered -> Confirmed | NotConfirmed, or a re-entry on an already
    /// resolved job, decided by `reentry`.
    pub(crate) fn resolve(
        &self,
        protocol_number: &str,
        outcome: ConfirmationOutcome,
        confirmation_code: &str,
        reentry: ConfirmationReentry,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationAck, SettlementError> {
        let not_found = || SettlementError::ProtocolNotFound(protocol_number.to_string());
        let initiation_code = self.code_for_protocol(protocol_number).ok_or_else(not_found)?;
        let mut job = self.jobs.get_mut(&initiation_code).ok_or_else(not_found)?;

        match job.status {
            JobStatus::Registered => {
                job.status = match outcome {
                    ConfirmationOutcome::Confirmed => JobStatus::Confirmed,
                    ConfirmationOutcome::NotConfirmed => JobStatus::NotConfirmed,
                };
                job.confirmation_code = Some(confirmation_code.to_string());
                job.confirmed_at = Some(now);
                job.updated_at = now;
                Ok(ConfirmationAck::new(outcome, protocol_number))
            }
            JobStatus::Confirmed | JobStatus::NotConfirmed => {
                let existing = job.confirmation_code.clone().unwrap_or_default();
                if reentry == ConfirmationReentry::Idempotent && existing == confirmation_code {
                    Ok(ConfirmationAck::new(outcome, protocol_number))
                } else {
                    Err(SettlementError::ConflictingConfirmation { existing })
                }
            }
            JobStatus::Pending | JobStatus::Error => Err(not_found()),
        }
    }

    /// Drops every non-pending job whose last transition is older than
    /// `retention`. Returns how many were evicted.
    pub fn sweep(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let cutoff = now - retention;
        let mut evicted = 0;
        self.jobs.retain(|_, job| {
            let expired = job.status != JobStatus::Pending && job.updated_at < cutoff;
            if expired {
                if let Some(protocol) = &job.protocol_number {
                    self.protocols
                        .remove_if(protocol, |_, code| code == &job.initiation_code);
                }
                evicted += 1;
            }
            !expired
        });
        evicted
    }
}
