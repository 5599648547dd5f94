use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use axum_prometheus::PrometheusMetricLayer;
use settlement_backend::config;
use settlement_backend::records::{InMemoryRecordStore, RecordStore};
use settlement_backend::settlement::{
    retention, ConfirmationIntake, HttpRegistrationClient, RegistrationClient, SettlementEngine,
};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let settings = config::settlement_config_from_env()?;

    let records: Arc<dyn RecordStore> =
        Arc::new(InMemoryRecordStore::from_path(config::BOLETO_DATA_PATH.as_str())?);

    let client: Arc<dyn RegistrationClient> = Arc::new(HttpRegistrationClient::new(
        settings.registration_url.clone(),
        settings.registration_token.clone(),
        settings.engine.call_timeout,
        settings.reference_fields.clone(),
    )?);
    tracing::info!(
        endpoint = %settings.registration_url,
        timeout_secs = settings.engine.call_timeout.as_secs(),
        authenticated = settings.registration_token.is_some(),
        "settlement registration client configured"
    );

    let engine = Arc::new(SettlementEngine::new(
        records.clone(),
        client,
        settings.engine.clone(),
    ));
    let intake = ConfirmationIntake::new(engine.clone(), settings.confirmation);

    if let Some(window) = settings.job_retention {
        tracing::info!(
            retention_secs = window.num_seconds(),
            "settlement job retention enabled"
        );
        retention::spawn(engine.clone(), window, settings.sweep_interval);
    }

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(settlement_backend::app(records, engine, intake))
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
