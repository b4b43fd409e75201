//! Gateway trait and its HTTP implementation.

use crate::error::{GatewayError, GatewayResult};
use crate::operation::Operation;
use rd_core::storage::{KeyValueStore, KEY_AUTH_TOKEN};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Boxed future type for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Request/response access to the backend.
///
/// Implemented over HTTP in production and scripted in tests.
pub trait Gateway: Send + Sync {
    /// Run `operation` and return the JSON found under `data.<field>`.
    fn execute(&self, operation: &'static Operation, variables: Value)
        -> BoxFuture<'_, GatewayResult<Value>>;
}

/// Arc wrapper for Gateway trait objects.
pub type DynGateway = Arc<dyn Gateway>;

/// Execute `operation` and decode its result as `T`.
pub async fn call<T: DeserializeOwned>(
    gateway: &dyn Gateway,
    operation: &'static Operation,
    variables: Value,
) -> GatewayResult<T> {
    let data = gateway.execute(operation, variables).await?;
    Ok(serde_json::from_value(data)?)
}

/// Default timeout for gateway requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// GraphQL over HTTP POST.
pub struct HttpGateway {
    client: Client,
    url: String,
    storage: Arc<dyn KeyValueStore>,
}

impl HttpGateway {
    /// Create a gateway for `url`.
    ///
    /// The bearer token is read from `storage` on every request, so a login
    /// or logout takes effect without rebuilding the gateway.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        storage: Arc<dyn KeyValueStore>,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            storage,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, operation: &'static Operation, variables: Value) -> GatewayResult<Value> {
        let request_id = Uuid::new_v4();
        debug!(operation = operation.name, %request_id, "Executing gateway operation");

        let body = json!({
            "operationName": operation.name,
            "query": operation.document,
            "variables": variables,
        });

        let mut request = self
            .client
            .post(&self.url)
            .header("x-request-id", request_id.to_string())
            .json(&body);
        if let Some(token) = self.storage.get(KEY_AUTH_TOKEN).filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(operation = operation.name, %request_id, %status, "Gateway returned error status");
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to parse response: {e}")))?;

        let result = extract(operation, payload);
        if let Err(e) = &result {
            warn!(operation = operation.name, %request_id, error = %e, "Gateway operation failed");
        }
        result
    }
}

impl Gateway for HttpGateway {
    fn execute(
        &self,
        operation: &'static Operation,
        variables: Value,
    ) -> BoxFuture<'_, GatewayResult<Value>> {
        Box::pin(self.post(operation, variables))
    }
}

/// Pull `data.<field>` out of a GraphQL response body.
///
/// A non-empty `errors` array wins over any partial data. A field present
/// as `null` is returned as `Value::Null`.
pub(crate) fn extract(operation: &Operation, payload: Value) -> GatewayResult<Value> {
    if let Some(first) = payload
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        let message = first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let code = first
            .pointer("/extensions/code")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(GatewayError::Graphql { message, code });
    }

    payload
        .get("data")
        .and_then(|data| data.get(operation.field))
        .cloned()
        .ok_or_else(|| GatewayError::MissingField(format!("data.{}", operation.field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{DISPATCH, LOGIN};
    use rd_core::storage::MemoryStorage;

    #[test]
    fn test_extract_field() {
        let payload = json!({"data": {"dispatch": {"id": "1", "status": "pending"}}});
        let value = extract(&DISPATCH, payload).unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn test_extract_null_field() {
        let payload = json!({"data": {"dispatch": null}});
        assert!(extract(&DISPATCH, payload).unwrap().is_null());
    }

    #[test]
    fn test_extract_missing_field() {
        let payload = json!({"data": {}});
        assert!(matches!(
            extract(&DISPATCH, payload),
            Err(GatewayError::MissingField(f)) if f == "data.dispatch"
        ));
    }

    #[test]
    fn test_extract_graphql_error_wins() {
        let payload = json!({
            "data": {"login": null},
            "errors": [{"message": "Invalid credentials", "extensions": {"code": "UNAUTHENTICATED"}}]
        });
        match extract(&LOGIN, payload) {
            Err(GatewayError::Graphql { message, code }) => {
                assert_eq!(message, "Invalid credentials");
                assert_eq!(code.as_deref(), Some("UNAUTHENTICATED"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_errors_array_is_ignored() {
        let payload = json!({"data": {"dispatch": {"id": "1"}}, "errors": []});
        assert!(extract(&DISPATCH, payload).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let gateway = HttpGateway::new(
            "http://127.0.0.1:1/graphql",
            Duration::from_secs(2),
            Arc::new(MemoryStorage::new()),
        )
        .unwrap();
        let result = gateway.execute(&DISPATCH, json!({"id": "1"})).await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }
}
