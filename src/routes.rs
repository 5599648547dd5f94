use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::records::{self, RecordStore};
use crate::settlement::{api as settlement, ConfirmationIntake, SettlementEngine};

async fn root() -> &'static str {
    "Boleto Settlement API"
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/boletos/lookup", post(records::lookup_by_barcode))
        .route("/api/boletos/barcode/:barcode", get(records::get_by_barcode))
        .route(
            "/api/boletos/initiation-codes",
            post(settlement::issue_code),
        )
        .route("/api/settlements", post(settlement::start_settlement))
        .route("/api/confirmations", post(settlement::confirm_settlement))
        .route(
            "/api/settlements/:initiation_code",
            get(settlement::settlement_status),
        )
        // callback path registered with the settlement authority
        .route("/confirmarAtendimento", post(settlement::confirm_callback))
}

/// Full application router with its shared state attached.
pub fn app(
    records: Arc<dyn RecordStore>,
    engine: Arc<SettlementEngine>,
    intake: ConfirmationIntake,
) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(api_routes())
        .layer(Extension(records))
        .layer(Extension(engine))
        .layer(Extension(intake))
}
