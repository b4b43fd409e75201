//! Consumption views over a store.
//!
//! A view is what a screen holds: a read-only window on one container plus
//! an action handle scoped to the view's lifetime. Dropping the view cancels
//! its token, so responses for actions it started are discarded.

use crate::container::ContainerState;
use crate::store::Store;
use rd_core::{ActionError, ErrorKind};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct StoreView<S: Store> {
    store: S,
    cancel: CancellationToken,
    changes: watch::Receiver<u64>,
    local_error: Option<ActionError>,
    retry_delay: Duration,
}

impl<S: Store> StoreView<S> {
    pub fn new(store: &S) -> Self {
        let cancel = store.cancellation().child_token();
        let store = store.with_cancellation(cancel.clone());
        let changes = store.changes();
        Self {
            store,
            cancel,
            changes,
            local_error: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Pause between attempts in [`StoreView::retry`].
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn state(&self) -> ContainerState<S::Item, S::Filters> {
        self.store.state()
    }

    /// Project a slice of the current state.
    pub fn select<R>(&self, f: impl FnOnce(&ContainerState<S::Item, S::Filters>) -> R) -> R {
        self.store.container().read(f)
    }

    /// Wait for the next change to the container. Returns false once the
    /// view is cancelled.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            result = self.changes.changed() => result.is_ok(),
        }
    }

    /// Wait until the projected slice differs from its current value and
    /// return the new value. `None` once the view is cancelled.
    pub async fn next_slice_change<R, P>(&mut self, project: P) -> Option<R>
    where
        R: PartialEq,
        P: Fn(&ContainerState<S::Item, S::Filters>) -> R,
    {
        let current = self.select(&project);
        loop {
            if !self.changed().await {
                return None;
            }
            let next = self.select(&project);
            if next != current {
                return Some(next);
            }
        }
    }

    /// The store, with actions bound to this view's lifetime.
    pub fn actions(&self) -> &S {
        &self.store
    }

    /// Container error first, then the view's own.
    pub fn error(&self) -> Option<ActionError> {
        self.select(|s| s.error.clone())
            .or_else(|| self.local_error.clone())
    }

    /// Record an error raised by the view itself, e.g. from a form.
    pub fn set_local_error(&mut self, message: impl Into<String>) {
        self.local_error = Some(ActionError::validation(message));
    }

    pub fn clear_local_error(&mut self) {
        self.local_error = None;
    }

    /// Run `action` until it leaves no network error on the container, at
    /// most `max_attempts` times. Any other error ends the loop at once.
    pub async fn retry<F, Fut>(&self, max_attempts: u32, action: F) -> Result<(), ActionError>
    where
        F: Fn(S) -> Fut,
        Fut: Future<Output = ()>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            action(self.store.clone()).await;

            let Some(error) = self.select(|s| s.error.clone()) else {
                return Ok(());
            };
            if self.cancel.is_cancelled() {
                return Err(ActionError::Cancelled);
            }
            if error.kind() != ErrorKind::Network || attempt >= max_attempts {
                if attempt > 1 {
                    warn!(
                        container = self.store.container().name(),
                        attempt,
                        error = %error,
                        "Giving up after retries"
                    );
                }
                return Err(error);
            }

            debug!(
                container = self.store.container().name(),
                attempt,
                max_attempts,
                error = %error,
                "Retrying after network error"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return Err(ActionError::Cancelled),
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<S: Store> Drop for StoreView<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Page;
    use crate::dispatch::DispatchStore;
    use crate::test_support::wait_for_calls;
    use rd_core::{DispatchFilters, DispatchStatus};
    use rd_gateway::operation::DISPATCHES;
    use rd_gateway::{GatewayError, MockGateway};
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> (DispatchStore, Arc<MockGateway>) {
        let gateway = Arc::new(MockGateway::new());
        (DispatchStore::new(gateway.clone(), Page::default()), gateway)
    }

    #[tokio::test]
    async fn test_view_reads_and_acts_on_shared_container() {
        let (store, gateway) = store();
        let view = StoreView::new(&store);
        gateway.respond(&DISPATCHES, json!([{"id": "1", "status": "pending"}]));

        view.actions().load(None, None).await;

        assert_eq!(view.select(|s| s.items.len()), 1);
        assert_eq!(store.state().items, view.state().items);
    }

    #[tokio::test]
    async fn test_dropped_view_discards_response() {
        let (store, gateway) = store();
        let gate = gateway.gate(&DISPATCHES);
        let view = StoreView::new(&store);

        let actions = view.actions().clone();
        let task = tokio::spawn(async move { actions.load(None, None).await });
        wait_for_calls(&gateway, &DISPATCHES, 1).await;

        drop(view);
        gate.resolve(json!([{"id": "1", "status": "pending"}]));
        task.await.unwrap();

        let s = store.state();
        assert!(s.items.is_empty());
        assert!(s.error.is_none());
        assert!(!s.loading);
        assert!(!store.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_error_prefers_container_over_local() {
        let (store, gateway) = store();
        let mut view = StoreView::new(&store);
        assert!(view.error().is_none());

        view.set_local_error("Pick an ambulance first");
        assert_eq!(view.error().unwrap().to_string(), "Pick an ambulance first");

        gateway.fail(&DISPATCHES, GatewayError::Transport("network down".into()));
        view.actions().load(None, None).await;
        assert_eq!(view.error().unwrap().to_string(), "network down");

        view.actions().clear_error();
        view.clear_local_error();
        assert!(view.error().is_none());
    }

    #[tokio::test]
    async fn test_changed_fires_on_container_write() {
        let (store, _) = store();
        let mut view = StoreView::new(&store);

        store.set_filters(DispatchFilters {
            status: Some(DispatchStatus::EnRoute),
            ..Default::default()
        });
        assert!(view.changed().await);
    }

    #[tokio::test]
    async fn test_next_slice_change_skips_unrelated_writes() {
        let (store, gateway) = store();
        let mut view = StoreView::new(&store);
        let writer = store.clone();

        let task = tokio::spawn(async move {
            writer.set_filters(DispatchFilters {
                status: Some(DispatchStatus::EnRoute),
                ..Default::default()
            });
            gateway.respond(&DISPATCHES, json!([{"id": "1", "status": "en_camino"}]));
            writer.load(None, None).await;
        });

        let count = view.next_slice_change(|s| s.items.len()).await;
        assert_eq!(count, Some(1));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_until_network_recovers() {
        let (store, gateway) = store();
        let view = StoreView::new(&store).with_retry_delay(Duration::ZERO);
        gateway.fail(&DISPATCHES, GatewayError::Transport("network down".into()));
        gateway.fail(&DISPATCHES, GatewayError::Transport("network down".into()));
        gateway.respond(&DISPATCHES, json!([{"id": "1", "status": "pending"}]));

        view.retry(5, |s| async move { s.load(None, None).await }).await.unwrap();

        assert_eq!(gateway.call_count(&DISPATCHES), 3);
        assert_eq!(view.select(|s| s.items.len()), 1);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_network_error() {
        let (store, gateway) = store();
        let view = StoreView::new(&store).with_retry_delay(Duration::ZERO);
        gateway.fail(
            &DISPATCHES,
            GatewayError::Graphql {
                message: "Invalid filter".into(),
                code: Some("BAD_USER_INPUT".into()),
            },
        );

        let err = view.retry(5, |s| async move { s.load(None, None).await }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(gateway.call_count(&DISPATCHES), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let (store, gateway) = store();
        let view = StoreView::new(&store).with_retry_delay(Duration::ZERO);
        for _ in 0..3 {
            gateway.fail(&DISPATCHES, GatewayError::Transport("network down".into()));
        }

        let err = view.retry(2, |s| async move { s.load(None, None).await }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(gateway.call_count(&DISPATCHES), 2);
    }
}
