//! Generic domain state container.
//!
//! Holds the list/selection/loading/error state of one domain. Every write
//! goes through a method here so the invariants hold by construction:
//! - `items` never holds two entries with the same identity
//! - a patch reaches both the list entry and `selected`
//! - `loading` is true exactly while an invocation is in flight
//!
//! Observers are notified through a `watch` version counter.

use parking_lot::RwLock;
use rd_core::{ActionError, Filters, Record, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Page {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            offset: 0,
        }
    }

    pub fn next(&self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

/// Snapshot of one container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerState<T, F> {
    pub items: Vec<T>,
    pub selected: Option<T>,
    pub loading: bool,
    pub error: Option<ActionError>,
    pub filters: F,
    pub total_count: u64,
    pub page: Page,
}

impl<T: Record, F: Filters> ContainerState<T, F> {
    fn new(page: Page) -> Self {
        Self {
            items: Vec::new(),
            selected: None,
            loading: false,
            error: None,
            filters: F::default(),
            total_count: 0,
            page,
        }
    }

    pub fn get(&self, id: &RecordId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.get(id).is_some()
    }

    /// The list entry for `id`, falling back to `selected`.
    pub fn find(&self, id: &RecordId) -> Option<&T> {
        self.get(id)
            .or_else(|| self.selected.as_ref().filter(|s| s.id() == id))
    }

    pub fn is_selected(&self, id: &RecordId) -> bool {
        self.selected.as_ref().is_some_and(|s| s.id() == id)
    }
}

/// Request kinds whose responses are sequenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sequence {
    Load,
    Select,
}

struct Inner<T, F> {
    state: ContainerState<T, F>,
    in_flight: usize,
}

pub struct Container<T: Record, F: Filters> {
    name: &'static str,
    inner: RwLock<Inner<T, F>>,
    version: watch::Sender<u64>,
    load_seq: AtomicU64,
    select_seq: AtomicU64,
    wired: Arc<AtomicBool>,
}

impl<T: Record, F: Filters> Container<T, F> {
    pub fn new(name: &'static str, page: Page) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            name,
            inner: RwLock::new(Inner {
                state: ContainerState::new(page),
                in_flight: 0,
            }),
            version,
            load_seq: AtomicU64::new(0),
            select_seq: AtomicU64::new(0),
            wired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn snapshot(&self) -> ContainerState<T, F> {
        self.inner.read().state.clone()
    }

    /// Project part of the state without cloning the rest.
    pub fn read<R>(&self, f: impl FnOnce(&ContainerState<T, F>) -> R) -> R {
        f(&self.inner.read().state)
    }

    /// Receiver that changes on every state write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn update<R>(&self, f: impl FnOnce(&mut ContainerState<T, F>) -> R) -> R {
        let result = f(&mut self.inner.write().state);
        self.notify();
        result
    }

    /// Apply `f`, notifying only if it reports a change.
    fn modify(&self, f: impl FnOnce(&mut ContainerState<T, F>) -> bool) -> bool {
        let changed = f(&mut self.inner.write().state);
        if changed {
            self.notify();
        }
        changed
    }

    // Invocation lifecycle

    /// Start an invocation: clears `error` and raises `loading` together.
    pub(crate) fn begin(&self) -> InFlight<'_, T, F> {
        {
            let mut inner = self.inner.write();
            inner.in_flight += 1;
            inner.state.loading = true;
            inner.state.error = None;
        }
        self.notify();
        InFlight { container: self }
    }

    fn finish(&self) {
        {
            let mut inner = self.inner.write();
            inner.in_flight = inner.in_flight.saturating_sub(1);
            inner.state.loading = inner.in_flight > 0;
        }
        self.notify();
    }

    /// Record a failed action on `error`. Cancellations are not recorded.
    pub(crate) fn record_failure(&self, action: &str, error: ActionError) {
        if error == ActionError::Cancelled {
            debug!(container = self.name, action, "Action cancelled, response dropped");
            return;
        }
        let error = error.or_default_message(action);
        warn!(
            container = self.name,
            action,
            kind = error.kind().as_str(),
            error = %error,
            "Action failed"
        );
        self.update(|s| s.error = Some(error));
    }

    pub(crate) fn issue(&self, sequence: Sequence) -> u64 {
        self.counter(sequence).fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `token` is still the latest issued for `sequence`.
    pub(crate) fn is_current(&self, sequence: Sequence, token: u64) -> bool {
        let current = self.counter(sequence).load(Ordering::SeqCst);
        if current != token {
            debug!(container = self.name, ?sequence, token, current, "Dropping stale response");
        }
        current == token
    }

    fn counter(&self, sequence: Sequence) -> &AtomicU64 {
        match sequence {
            Sequence::Load => &self.load_seq,
            Sequence::Select => &self.select_seq,
        }
    }

    // Items

    /// Replace the list, keeping the first of any duplicated identity.
    /// `selected` takes the fresh copy when the new list holds it.
    ///
    /// `total` defaults to the number of items kept.
    pub(crate) fn replace_items(&self, items: Vec<T>, total: Option<u64>) {
        let mut seen = HashSet::new();
        let items: Vec<T> = items
            .into_iter()
            .filter(|item| seen.insert(item.id().clone()))
            .collect();
        trace!(container = self.name, count = items.len(), "Items replaced");
        self.update(|s| {
            s.total_count = total.unwrap_or(items.len() as u64);
            if let Some(fresh) = s.selected.as_ref().and_then(|sel| {
                items.iter().find(|item| item.id() == sel.id()).cloned()
            }) {
                s.selected = Some(fresh);
            }
            s.items = items;
        });
    }

    /// Insert `item` at the head of the list, dropping any entry with the
    /// same identity first (refreshing a matching `selected`). Returns whether the identity was new; only then
    /// does `total_count` grow.
    pub(crate) fn prepend(&self, item: T) -> bool {
        self.update(|s| {
            let before = s.items.len();
            s.items.retain(|existing| existing.id() != item.id());
            let is_new = s.items.len() == before;
            if s.is_selected(item.id()) {
                s.selected = Some(item.clone());
            }
            s.items.insert(0, item);
            if is_new {
                s.total_count = s.total_count.saturating_add(1);
            }
            is_new
        })
    }

    /// Patch the entry with `id` and `selected` when it has the same
    /// identity. Unknown ids are a no-op.
    pub(crate) fn patch(&self, id: &RecordId, f: impl Fn(&mut T)) -> bool {
        self.modify(|s| {
            let mut changed = false;
            if let Some(entry) = s.items.iter_mut().find(|item| item.id() == id) {
                f(entry);
                changed = true;
            }
            if let Some(selected) = s.selected.as_mut().filter(|sel| sel.id() == id) {
                f(selected);
                changed = true;
            }
            changed
        })
    }

    /// Replace the entry and `selected` holding `item`'s identity.
    pub(crate) fn replace(&self, item: T) -> bool {
        let id = item.id().clone();
        self.patch(&id, |target| *target = item.clone())
    }

    /// Patch `selected` alone; `f` reports whether it changed anything.
    pub(crate) fn update_selected(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.modify(|s| s.selected.as_mut().is_some_and(f))
    }

    /// Remove the entry with `id`; clears `selected` when it matches.
    pub(crate) fn remove(&self, id: &RecordId) -> bool {
        self.modify(|s| {
            let before = s.items.len();
            s.items.retain(|item| item.id() != id);
            let removed = s.items.len() != before;
            if removed {
                s.total_count = s.total_count.saturating_sub(1);
            }
            let deselected = s.is_selected(id);
            if deselected {
                s.selected = None;
            }
            removed || deselected
        })
    }

    pub(crate) fn set_selected(&self, selected: Option<T>) {
        self.update(|s| s.selected = selected);
    }

    pub(crate) fn set_page(&self, page: Page) {
        self.update(|s| s.page = page);
    }

    // Plain state helpers

    /// Overlay the criteria set on `filters`, returning the merged result.
    pub fn set_filters(&self, filters: F) -> F {
        self.update(|s| {
            s.filters.merge(filters);
            s.filters.clone()
        })
    }

    pub fn clear_filters(&self) {
        self.update(|s| s.filters = F::default());
    }

    pub fn clear_selection(&self) {
        self.update(|s| s.selected = None);
    }

    pub fn clear_error(&self) {
        self.update(|s| s.error = None);
    }

    /// Back to the initial state, keeping the page size. Responses to
    /// requests issued before the reset are dropped.
    pub fn reset(&self) {
        self.load_seq.fetch_add(1, Ordering::SeqCst);
        self.select_seq.fetch_add(1, Ordering::SeqCst);
        self.update(|s| {
            let limit = s.page.limit;
            let loading = s.loading;
            *s = ContainerState::new(Page::new(limit));
            s.loading = loading;
        });
        debug!(container = self.name, "Container reset");
    }

    // Wiring guard

    /// Mark the container as wired. Returns the flag to release on detach,
    /// or `None` when it is already wired.
    pub(crate) fn claim_wiring(&self) -> Option<Arc<AtomicBool>> {
        self.wired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| self.wired.clone())
    }

    pub fn is_wired(&self) -> bool {
        self.wired.load(Ordering::SeqCst)
    }
}

/// Keeps `loading` raised for one invocation; lowers it on drop.
#[must_use]
pub(crate) struct InFlight<'a, T: Record, F: Filters> {
    container: &'a Container<T, F>,
}

impl<T: Record, F: Filters> Drop for InFlight<'_, T, F> {
    fn drop(&mut self) {
        self.container.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rd_core::{Dispatch, DispatchFilters, DispatchStatus};

    type TestContainer = Container<Dispatch, DispatchFilters>;

    fn dispatch(id: &str, status: DispatchStatus) -> Dispatch {
        Dispatch::new(id, status)
    }

    fn container() -> TestContainer {
        Container::new("dispatch", Page::default())
    }

    #[test]
    fn test_initial_state() {
        let c = container();
        let s = c.snapshot();
        assert!(s.items.is_empty());
        assert!(s.selected.is_none());
        assert!(!s.loading);
        assert!(s.error.is_none());
        assert_eq!(s.page.limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_replace_items_deduplicates() {
        let c = container();
        c.replace_items(
            vec![
                dispatch("1", DispatchStatus::Pending),
                dispatch("2", DispatchStatus::Pending),
                dispatch("1", DispatchStatus::Assigned),
            ],
            None,
        );
        let s = c.snapshot();
        assert_eq!(s.items.len(), 2);
        assert_eq!(s.items[0].status, DispatchStatus::Pending);
        assert_eq!(s.total_count, 2);
    }

    #[test]
    fn test_prepend_replaces_existing_identity() {
        let c = container();
        c.replace_items(vec![dispatch("1", DispatchStatus::Pending)], None);

        assert!(c.prepend(dispatch("2", DispatchStatus::Pending)));
        assert!(!c.prepend(dispatch("1", DispatchStatus::Assigned)));

        let s = c.snapshot();
        let ids: Vec<&str> = s.items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(s.items[0].status, DispatchStatus::Assigned);
        assert_eq!(s.total_count, 2);
    }

    #[test]
    fn test_patch_reaches_entry_and_selected() {
        let c = container();
        c.replace_items(vec![dispatch("1", DispatchStatus::EnRoute)], None);
        c.set_selected(Some(dispatch("1", DispatchStatus::EnRoute)));

        assert!(c.patch(&"1".into(), |d| d.status = DispatchStatus::OnSite));

        let s = c.snapshot();
        assert_eq!(s.items[0].status, DispatchStatus::OnSite);
        assert_eq!(s.selected.unwrap().status, DispatchStatus::OnSite);
    }

    #[test]
    fn test_patch_selected_only_when_not_listed() {
        let c = container();
        c.set_selected(Some(dispatch("9", DispatchStatus::EnRoute)));

        assert!(c.patch(&"9".into(), |d| d.status = DispatchStatus::OnSite));
        assert_eq!(c.snapshot().selected.unwrap().status, DispatchStatus::OnSite);
    }

    #[test]
    fn test_patch_unknown_id_is_noop() {
        let c = container();
        c.replace_items(vec![dispatch("1", DispatchStatus::Pending)], None);
        let before = c.snapshot();
        let mut rx = c.subscribe();
        let _ = rx.borrow_and_update();

        assert!(!c.patch(&"404".into(), |d| d.status = DispatchStatus::Cancelled));
        assert_eq!(c.snapshot(), before);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_remove_clears_matching_selection() {
        let c = container();
        c.replace_items(
            vec![
                dispatch("1", DispatchStatus::Pending),
                dispatch("2", DispatchStatus::Pending),
            ],
            None,
        );
        c.set_selected(Some(dispatch("1", DispatchStatus::Pending)));

        assert!(c.remove(&"1".into()));
        let s = c.snapshot();
        assert_eq!(s.items.len(), 1);
        assert!(s.selected.is_none());
        assert_eq!(s.total_count, 1);
    }

    #[test]
    fn test_begin_clears_error_and_sets_loading() {
        let c = container();
        c.record_failure("load dispatches", ActionError::Network("offline".into()));
        assert!(c.snapshot().error.is_some());

        let flight = c.begin();
        let s = c.snapshot();
        assert!(s.loading);
        assert!(s.error.is_none());

        drop(flight);
        assert!(!c.snapshot().loading);
    }

    #[test]
    fn test_loading_held_while_any_invocation_in_flight() {
        let c = container();
        let a = c.begin();
        let b = c.begin();
        drop(a);
        assert!(c.snapshot().loading);
        drop(b);
        assert!(!c.snapshot().loading);
    }

    #[test]
    fn test_record_failure_defaults_empty_message() {
        let c = container();
        c.record_failure("load dispatches", ActionError::Backend(String::new()));
        assert_eq!(
            c.snapshot().error.unwrap().to_string(),
            "Failed to load dispatches"
        );
    }

    #[test]
    fn test_cancellation_is_not_recorded() {
        let c = container();
        c.record_failure("load dispatches", ActionError::Cancelled);
        assert!(c.snapshot().error.is_none());
    }

    #[test]
    fn test_sequence_tokens() {
        let c = container();
        let first = c.issue(Sequence::Load);
        let second = c.issue(Sequence::Load);
        assert!(!c.is_current(Sequence::Load, first));
        assert!(c.is_current(Sequence::Load, second));

        let select = c.issue(Sequence::Select);
        assert!(c.is_current(Sequence::Select, select));
        assert!(c.is_current(Sequence::Load, second));
    }

    #[test]
    fn test_reset_invalidates_outstanding_tokens() {
        let c = container();
        let token = c.issue(Sequence::Load);
        c.replace_items(vec![dispatch("1", DispatchStatus::Pending)], None);
        c.set_filters(DispatchFilters {
            hours: Some(4),
            ..Default::default()
        });

        c.reset();
        assert!(!c.is_current(Sequence::Load, token));
        let s = c.snapshot();
        assert!(s.items.is_empty());
        assert!(s.filters.is_empty());
    }

    #[test]
    fn test_wiring_claim_is_exclusive() {
        let c = container();
        let flag = c.claim_wiring().unwrap();
        assert!(c.claim_wiring().is_none());
        flag.store(false, Ordering::SeqCst);
        assert!(c.claim_wiring().is_some());
    }

    #[test]
    fn test_page_next() {
        let page = Page::new(10);
        assert_eq!(page.next(), Page { limit: 10, offset: 10 });
        assert_eq!(Page::new(0).limit, 1);
    }
}
