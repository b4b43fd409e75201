//! Plumbing shared by the domain stores.

use crate::container::{Container, ContainerState};
use rd_core::{ActionError, Filters, Record};
use rd_gateway::{call, DynGateway, Operation};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A cloneable handle onto one domain container.
///
/// Clones share the container. A handle made by [`Store::with_cancellation`]
/// drops the responses of its in-flight actions once its token is cancelled.
pub trait Store: Clone + Send + Sync + 'static {
    type Item: Record;
    type Filters: Filters;

    fn container(&self) -> &Arc<Container<Self::Item, Self::Filters>>;

    fn cancellation(&self) -> &CancellationToken;

    fn with_cancellation(&self, token: CancellationToken) -> Self;

    fn state(&self) -> ContainerState<Self::Item, Self::Filters> {
        self.container().snapshot()
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.container().subscribe()
    }
}

#[derive(Clone)]
pub(crate) struct StoreHandle<T: Record, F: Filters> {
    pub(crate) container: Arc<Container<T, F>>,
    gateway: DynGateway,
    cancel: CancellationToken,
}

impl<T: Record, F: Filters> StoreHandle<T, F> {
    pub(crate) fn new(container: Container<T, F>, gateway: DynGateway) -> Self {
        Self {
            container: Arc::new(container),
            gateway,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn scoped(&self, cancel: CancellationToken) -> Self {
        Self {
            container: self.container.clone(),
            gateway: self.gateway.clone(),
            cancel,
        }
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Call the gateway; resolves `Cancelled` as soon as the handle is.
    pub(crate) async fn request<R: DeserializeOwned>(
        &self,
        operation: &'static Operation,
        variables: Value,
    ) -> Result<R, ActionError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ActionError::Cancelled),
            result = call::<R>(self.gateway.as_ref(), operation, variables) => {
                result.map_err(ActionError::from)
            }
        }
    }

    /// Run one invocation: `loading` is held for its duration and a failure
    /// lands on `error` before being handed back.
    pub(crate) async fn perform<R, Fut>(&self, action: &str, fut: Fut) -> Result<R, ActionError>
    where
        Fut: Future<Output = Result<R, ActionError>>,
    {
        let _in_flight = self.container.begin();
        let result = fut.await;
        if let Err(e) = &result {
            self.container.record_failure(action, e.clone());
        }
        result
    }
}
