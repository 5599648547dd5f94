pub mod api;
pub mod client;
pub mod codes;
pub mod confirmation;
pub mod dispatcher;
pub mod jobs;
pub mod models;
pub mod payload;
pub mod retention;
pub mod service;

pub use client::{
    HttpRegistrationClient, ReferenceExtractor, RegistrationClient, RegistrationError,
    RegistrationOutcome, REFERENCE_SENTINEL,
};
pub use codes::InitiationCodeRegistry;
pub use confirmation::{
    ConfirmationIntake, ConfirmationPolicy, ConfirmationReentry, UnknownProtocolStatus,
};
pub use jobs::JobTable;
pub use models::{
    ConfirmationAck, ConfirmationOutcome, InitiationCode, JobStatus, JobView, RecordKey,
    SettlementJob, StartedJob,
};
pub use payload::{AmountEncoding, ClientKeySource, PayloadMapping};
pub use service::{EngineSettings, SettlementEngine};
