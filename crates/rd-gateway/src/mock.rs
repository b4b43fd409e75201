//! Scripted gateway for tests.
//!
//! Responses are queued per operation name and consumed in order. A gated
//! response stays pending until the test resolves its [`Gate`], which lets
//! a test decide the order in which concurrent calls complete.

use crate::client::{BoxFuture, Gateway};
use crate::error::{GatewayError, GatewayResult};
use crate::operation::Operation;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

enum Scripted {
    Ready(GatewayResult<Value>),
    Gated(oneshot::Receiver<GatewayResult<Value>>),
}

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub variables: Value,
}

/// Completion handle for a gated response.
#[derive(Debug)]
pub struct Gate {
    tx: oneshot::Sender<GatewayResult<Value>>,
}

impl Gate {
    pub fn resolve(self, data: Value) {
        let _ = self.tx.send(Ok(data));
    }

    pub fn fail(self, error: GatewayError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Mock gateway for testing.
#[derive(Default)]
pub struct MockGateway {
    responses: Mutex<HashMap<&'static str, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue(&self, operation: &'static Operation, scripted: Scripted) {
        self.responses
            .lock()
            .entry(operation.name)
            .or_default()
            .push_back(scripted);
    }

    /// Queue a successful result for the next call to `operation`.
    pub fn respond(&self, operation: &'static Operation, data: Value) {
        self.enqueue(operation, Scripted::Ready(Ok(data)));
    }

    /// Queue a failure for the next call to `operation`.
    pub fn fail(&self, operation: &'static Operation, error: GatewayError) {
        self.enqueue(operation, Scripted::Ready(Err(error)));
    }

    /// Queue a response that completes only when the returned gate does.
    pub fn gate(&self, operation: &'static Operation) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.enqueue(operation, Scripted::Gated(rx));
        Gate { tx }
    }

    /// Get recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Variables of every call to `operation`, in call order.
    pub fn calls_to(&self, operation: &Operation) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation.name)
            .map(|call| call.variables.clone())
            .collect()
    }

    pub fn call_count(&self, operation: &Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation.name)
            .count()
    }

    /// Clear recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl Gateway for MockGateway {
    fn execute(
        &self,
        operation: &'static Operation,
        variables: Value,
    ) -> BoxFuture<'_, GatewayResult<Value>> {
        self.calls.lock().push(RecordedCall {
            operation: operation.name,
            variables,
        });
        let scripted = self
            .responses
            .lock()
            .get_mut(operation.name)
            .and_then(VecDeque::pop_front);

        Box::pin(async move {
            match scripted {
                Some(Scripted::Ready(result)) => result,
                Some(Scripted::Gated(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(GatewayError::Transport("gate dropped".to_string()))),
                None => Err(GatewayError::Transport(format!(
                    "no scripted response for {}",
                    operation.name
                ))),
            }
        })
    }
}
