use std::sync::Arc;

use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info};

use super::service::SettlementEngine;

/// key: settlement-retention -> periodic eviction of settled jobs
pub fn spawn(
    engine: Arc<SettlementEngine>,
    retention: chrono::Duration,
    interval: TokioDuration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = engine.sweep_expired(retention);
            if evicted > 0 {
                info!(
                    evicted,
                    remaining = engine.jobs().len(),
                    "evicted settlement jobs past retention"
                );
            } else {
                debug!("settlement retention sweep found nothing to evict");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};

    use crate::records::InMemoryRecordStore;
    use crate::settlement::{
        EngineSettings, RegistrationClient, RegistrationError, RegistrationOutcome, SettlementJob,
    };

    struct UnreachableClient;

    #[async_trait]
    impl RegistrationClient for UnreachableClient {
        async fn register(
            &self,
            _payload: &Value,
        ) -> Result<RegistrationOutcome, RegistrationError> {
            Err(RegistrationError::Transport("unreachable".into()))
        }
    }

    fn engine() -> Arc<SettlementEngine> {
        Arc::new(SettlementEngine::new(
            Arc::new(InMemoryRecordStore::default()),
            Arc::new(UnreachableClient),
            EngineSettings::default(),
        ))
    }

    fn insert_job(engine: &SettlementEngine, code: &str, at: chrono::DateTime<Utc>, failed: bool) {
        engine.jobs().insert_pending(SettlementJob::pending(
            code.into(),
            "BOL001".into(),
            "00190000090114971860".into(),
            json!({}),
            at,
        ));
        if failed {
            engine.jobs().mark_failed(code, "authority unreachable".into(), at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_settled_jobs_on_every_tick() {
        let engine = engine();
        let stale = Utc::now() - chrono::Duration::hours(2);
        insert_job(&engine, "CORR-OLD-1", stale, true);
        insert_job(&engine, "CORR-PENDING", stale, false);

        let sweeper = spawn(
            engine.clone(),
            chrono::Duration::hours(1),
            TokioDuration::from_secs(60),
        );

        time::sleep(TokioDuration::from_millis(1)).await;
        assert!(engine.status("CORR-OLD-1").is_err());
        assert!(engine.status("CORR-PENDING").is_ok());

        insert_job(&engine, "CORR-OLD-2", stale, true);
        time::sleep(TokioDuration::from_secs(30)).await;
        assert!(engine.status("CORR-OLD-2").is_ok());

        time::sleep(TokioDuration::from_secs(31)).await;
        assert!(engine.status("CORR-OLD-2").is_err());
        assert_eq!(engine.jobs().len(), 1);

        sweeper.abort();
    }
}
