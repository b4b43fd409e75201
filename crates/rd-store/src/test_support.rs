//! Fixtures shared by the store tests.

use rd_gateway::{MockGateway, Operation};
use std::time::Duration;

/// Wait until `gateway` has seen `count` calls to `operation`.
pub(crate) async fn wait_for_calls(gateway: &MockGateway, operation: &Operation, count: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while gateway.call_count(operation) < count {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(
        waited.is_ok(),
        "timed out waiting for {count} calls to {}",
        operation.name
    );
}
