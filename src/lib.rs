pub mod config;
pub mod error;
pub mod records;
pub mod routes;
pub mod settlement;

pub use config::{settlement_config_from_env, SettlementConfig};
pub use routes::{api_routes, app};
