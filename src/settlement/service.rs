use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::client::RegistrationClient;
use super::codes::InitiationCodeRegistry;
use super::confirmation::ConfirmationReentry;
use super::dispatcher::{start_dispatch_worker, DispatchHandle, DispatchRequest};
use super::jobs::JobTable;
use super::models::{
    ConfirmationAck, ConfirmationOutcome, InitiationCode, JobStatus, JobView, RecordKey,
    SettlementJob, StartedJob,
};
use super::payload::PayloadMapping;
use crate::error::SettlementError;
use crate::records::RecordStore;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mapping: PayloadMapping,
    pub call_timeout: Duration,
    pub dispatch_queue: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mapping: PayloadMapping::default(),
            call_timeout: Duration::from_secs(30),
            dispatch_queue: 64,
        }
    }
}

/// key: settlement-engine -> workflow start, polling and transitions
///
/// Owns the code registry and the job table. Must be constructed inside a
/// Tokio runtime because it spawns the dispatch worker.
pub struct SettlementEngine {
    codes: InitiationCodeRegistry,
    jobs: JobTable,
    records: Arc<dyn RecordStore>,
    mapping: PayloadMapping,
    dispatcher: DispatchHandle,
}

impl SettlementEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        client: Arc<dyn RegistrationClient>,
        settings: EngineSettings,
    ) -> Self {
        let jobs = JobTable::new();
        let dispatcher = start_dispatch_worker(
            jobs.clone(),
            client,
            settings.call_timeout,
            settings.dispatch_queue,
        );
        Self {
            codes: InitiationCodeRegistry::new(),
            jobs,
            records,
            mapping: settings.mapping,
            dispatcher,
        }
    }

    pub fn issue_code(&self) -> InitiationCode {
        self.codes.issue()
    }

    pub fn codes(&self) -> &InitiationCodeRegistry {
        &self.codes
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Validates the request, consumes the code and queues the outbound
    /// registration. Returns as soon as the job is recorded as `Pending`.
    pub async fn start(
        &self,
        initiation_code: &str,
        key: RecordKey,
    ) -> Result<StartedJob, SettlementError> {
        let code = initiation_code.trim();
        if code.is_empty() {
            return Err(SettlementError::MissingField("initiation_code"));
        }
        let (field, lookup) = match &key {
            RecordKey::Barcode(barcode) => ("barcode", barcode.trim()),
            RecordKey::DocumentId(id) => ("document_id", id.trim()),
        };
        if lookup.is_empty() {
            return Err(SettlementError::MissingField(field));
        }
        if !self.codes.is_issued_unused(code) {
            return Err(SettlementError::InvalidCode);
        }
        let record = match &key {
            RecordKey::Barcode(_) => self.records.find_by_barcode(lookup),
            RecordKey::DocumentId(_) => self.records.find_by_document_id(lookup),
        }
        .ok_or(SettlementError::RecordNotFound)?;

        let payload = self.mapping.build(code, &record)?;

        if !self.codes.mark_used(code) {
            return Err(SettlementError::InvalidCode);
        }
        let job = SettlementJob::pending(
            code.to_string(),
            record.document_id.clone(),
            record.barcode.clone(),
            payload.clone(),
            Utc::now(),
        );
        if !self.jobs.insert_pending(job) {
            return Err(SettlementError::InvalidCode);
        }
        tracing::info!(
            initiation_code = %code,
            document_id = %record.document_id,
            "settlement job created"
        );

        let request = DispatchRequest {
            initiation_code: code.to_string(),
            payload: payload.clone(),
        };
        if let Err(err) = self.dispatcher.dispatch(request) {
            self.jobs.mark_failed(code, err.to_string(), Utc::now());
            return Err(err);
        }

        Ok(StartedJob {
            initiation_code: code.to_string(),
            status: JobStatus::Pending,
            payload,
        })
    }

    pub fn status(&self, initiation_code: &str) -> Result<JobView, SettlementError> {
        self.jobs
            .view(initiation_code.trim())
            .ok_or(SettlementError::JobNotFound)
    }

    pub fn has_protocol(&self, protocol_number: &str) -> bool {
        self.jobs.code_for_protocol(protocol_number).is_some()
    }

    /// The only path through which a callback may mutate a job.
    pub fn apply_confirmation(
        &self,
        protocol_number: &str,
        outcome: ConfirmationOutcome,
        confirmation_code: &str,
        reentry: ConfirmationReentry,
    ) -> Result<ConfirmationAck, SettlementError> {
        self.jobs.resolve(
            protocol_number,
            outcome,
            confirmation_code,
            reentry,
            Utc::now(),
        )
    }

    pub fn sweep_expired(&self, retention: chrono::Duration) -> usize {
        self.jobs.sweep(Utc::now(), retention)
    }
}
