//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event hub error: {0}")]
    Hub(#[from] rd_hub::HubError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] rd_gateway::GatewayError),

    #[error("Storage error: {0}")]
    Storage(#[from] rd_core::StorageError),

    #[error("Wiring error: {0}")]
    Wiring(#[from] rd_store::WiringError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] rd_telemetry::TelemetryError),

    #[error("{0}")]
    Action(#[from] rd_core::ActionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
