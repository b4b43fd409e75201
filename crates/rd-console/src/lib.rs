//! Operator console for the ambulance dispatch client.
//!
//! Builds the client core from configuration and drives it:
//! - Event hub connection with degraded-mode fallback
//! - Domain containers kept current by real-time reconciliation
//! - Metrics and logs for every container change

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
