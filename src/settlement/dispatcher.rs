use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{channel, Sender};
use tracing::{error, info, warn};

use super::client::{RegistrationClient, RegistrationError, REFERENCE_SENTINEL};
use super::jobs::JobTable;
use crate::error::SettlementError;

/// key: settlement-dispatch -> one outbound registration per job
#[derive(Debug)]
pub struct DispatchRequest {
    pub initiation_code: String,
    pub payload: Value,
}

/// key: settlement-dispatch-handle -> enqueue interface
#[derive(Clone)]
pub struct DispatchHandle {
    sender: Sender<DispatchRequest>,
}

impl DispatchHandle {
    /// Enqueues without waiting. A full queue is refused rather than
    /// holding the caller until the worker catches up.
    pub fn dispatch(&self, request: DispatchRequest) -> Result<(), SettlementError> {
        self.sender.try_send(request).map_err(|err| match err {
            TrySendError::Full(_) => SettlementError::DispatchSaturated,
            TrySendError::Closed(_) => SettlementError::DispatchUnavailable,
        })
    }
}

/// Spawns the dispatch worker. Every request runs in its own task, supervised
/// so that a panic inside the client still resolves the job to `Error`.
pub fn start_dispatch_worker(
    jobs: JobTable,
    client: Arc<dyn RegistrationClient>,
    call_timeout: Duration,
    capacity: usize,
) -> DispatchHandle {
    let (tx, mut rx) = channel::<DispatchRequest>(capacity.max(1));
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let jobs = jobs.clone();
            let client = client.clone();
            tokio::spawn(async move {
                let initiation_code = request.initiation_code.clone();
                let task = tokio::spawn(register(jobs.clone(), client, call_timeout, request));
                if let Err(err) = task.await {
                    error!(
                        ?err,
                        initiation_code = %initiation_code,
                        "settlement dispatch task aborted"
                    );
                    jobs.mark_failed(
                        &initiation_code,
                        format!("dispatch task aborted: {err}"),
                        Utc::now(),
                    );
                }
            });
        }
        info!("settlement dispatch worker stopped");
    });

    DispatchHandle { sender: tx }
}

async fn register(
    jobs: JobTable,
    client: Arc<dyn RegistrationClient>,
    call_timeout: Duration,
    request: DispatchRequest,
) {
    let code = request.initiation_code;
    let result = match tokio::time::timeout(call_timeout, client.register(&request.payload)).await
    {
        Ok(result) => result,
        Err(_) => Err(RegistrationError::Timeout(call_timeout)),
    };

    match result {
        Ok(outcome) if outcome.success => {
            let protocol = outcome
                .reference_id
                .unwrap_or_else(|| REFERENCE_SENTINEL.to_string());
            if jobs.mark_registered(&code, protocol.clone(), outcome.raw_response, Utc::now()) {
                info!(initiation_code = %code, %protocol, "settlement registered");
            } else {
                warn!(initiation_code = %code, "registration result arrived for a job no longer pending");
            }
        }
        Ok(outcome) => {
            let cause = format!("authority reported failure: {}", outcome.raw_response);
            warn!(initiation_code = %code, %cause, "settlement registration refused");
            jobs.mark_failed(&code, cause, Utc::now());
        }
        Err(err) => {
            warn!(initiation_code = %code, %err, "settlement registration failed");
            jobs.mark_failed(&code, err.to_string(), Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(code: &str) -> DispatchRequest {
        DispatchRequest {
            initiation_code: code.into(),
            payload: json!({}),
        }
    }

    #[test]
    fn full_queue_is_refused_without_waiting() {
        let (tx, rx) = channel::<DispatchRequest>(1);
        let handle = DispatchHandle { sender: tx };

        assert!(handle.dispatch(request("C1")).is_ok());
        assert_eq!(
            handle.dispatch(request("C2")),
            Err(SettlementError::DispatchSaturated)
        );

        drop(rx);
        assert_eq!(
            handle.dispatch(request("C3")),
            Err(SettlementError::DispatchUnavailable)
        );
    }
}
