//! Backend gateway for the dispatch client.
//!
//! Every request/response interaction with the backend goes through the
//! [`Gateway`] trait:
//! - `HttpGateway`: GraphQL over HTTP POST with bearer auth
//! - `MockGateway`: scripted responses for tests
//! - `operation`: the catalogue of documents the stores use

pub mod client;
pub mod error;
pub mod mock;
pub mod operation;

pub use client::{call, BoxFuture, DynGateway, Gateway, HttpGateway, DEFAULT_TIMEOUT};
pub use error::{GatewayError, GatewayResult};
pub use mock::{Gate, MockGateway, RecordedCall};
pub use operation::Operation;
