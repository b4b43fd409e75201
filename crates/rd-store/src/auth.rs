//! Authentication container.
//!
//! The session is mirrored to local storage so the gateway and the event hub
//! can read the bearer token without holding a reference to this store.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rd_core::storage::{KEY_AUTH_TOKEN, KEY_TOKEN_EXPIRY, KEY_TOKEN_TYPE, KEY_USER};
use rd_core::{ActionError, AuthToken, KeyValueStore, LoginResponse, UserProfile};
use rd_gateway::operation::LOGIN;
use rd_gateway::{call, DynGateway};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Time source, injected so expiry can be tested.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub token: Option<AuthToken>,
    pub loading: bool,
    pub error: Option<ActionError>,
}

#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: RwLock<AuthState>,
    version: watch::Sender<u64>,
    gateway: DynGateway,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl AuthStore {
    /// Build the store and rehydrate any session left in `storage`.
    pub fn new(
        gateway: DynGateway,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (version, _) = watch::channel(0);
        let store = Self {
            inner: Arc::new(Inner {
                state: RwLock::new(AuthState::default()),
                version,
                gateway,
                storage,
                clock,
            }),
        };
        store.rehydrate();
        store
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.read().clone()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state.read().user.clone()
    }

    /// True while a token is held and has not expired.
    pub fn is_authenticated(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .state
            .read()
            .token
            .as_ref()
            .is_some_and(|t| !t.is_expired(now))
    }

    /// Sign in and persist the session.
    ///
    /// Failure is recorded on `error` and returned; the caller decides
    /// what happens next.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ActionError> {
        if username.trim().is_empty() || password.is_empty() {
            let err = ActionError::validation("Username and password are required");
            self.update(|s| s.error = Some(err.clone()));
            return Err(err);
        }

        self.update(|s| {
            s.loading = true;
            s.error = None;
        });

        let result = call::<LoginResponse>(
            self.inner.gateway.as_ref(),
            &LOGIN,
            json!({ "username": username, "password": password }),
        )
        .await
        .map_err(ActionError::from);

        match result {
            Ok(response) => {
                let token = response.token(self.inner.clock.now());
                self.persist(&token, &response.user);
                info!(username = %response.user.username, "Signed in");
                let user = response.user;
                self.update(|s| {
                    s.loading = false;
                    s.token = Some(token);
                    s.user = Some(user.clone());
                });
                Ok(user)
            }
            Err(e) => {
                let e = e.or_default_message("sign in");
                warn!(error = %e, "Sign in failed");
                self.update(|s| {
                    s.loading = false;
                    s.error = Some(e.clone());
                });
                Err(e)
            }
        }
    }

    /// Drop the session and its persisted keys.
    pub fn logout(&self) {
        self.clear_storage();
        self.update(|s| *s = AuthState::default());
        info!("Signed out");
    }

    pub fn clear_error(&self) {
        self.update(|s| s.error = None);
    }

    fn rehydrate(&self) {
        let storage = &self.inner.storage;
        let Some(access_token) = storage.get(KEY_AUTH_TOKEN) else {
            return;
        };
        let expires_at = storage
            .get(KEY_TOKEN_EXPIRY)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));
        let Some(expires_at) = expires_at else {
            warn!("Stored session has no valid expiry, discarding it");
            self.clear_storage();
            return;
        };
        let user = storage
            .get(KEY_USER)
            .and_then(|raw| serde_json::from_str::<UserProfile>(&raw).ok());
        let token = AuthToken {
            access_token,
            token_type: storage
                .get(KEY_TOKEN_TYPE)
                .unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
        };

        if token.is_expired(self.inner.clock.now()) {
            debug!(%expires_at, "Stored session expired");
        }
        self.update(|s| {
            s.token = Some(token);
            s.user = user;
        });
    }

    fn persist(&self, token: &AuthToken, user: &UserProfile) {
        let storage = &self.inner.storage;
        let user = match serde_json::to_string(user) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Failed to encode user profile");
                return;
            }
        };
        let writes = [
            (KEY_AUTH_TOKEN, token.access_token.clone()),
            (KEY_TOKEN_TYPE, token.token_type.clone()),
            (KEY_TOKEN_EXPIRY, token.expires_at.to_rfc3339()),
            (KEY_USER, user),
        ];
        for (key, value) in writes {
            if let Err(e) = storage.set(key, &value) {
                warn!(key, error = %e, "Failed to persist session key");
            }
        }
    }

    fn clear_storage(&self) {
        for key in [KEY_AUTH_TOKEN, KEY_TOKEN_TYPE, KEY_TOKEN_EXPIRY, KEY_USER] {
            if let Err(e) = self.inner.storage.remove(key) {
                warn!(key, error = %e, "Failed to clear session key");
            }
        }
    }

    fn update(&self, f: impl FnOnce(&mut AuthState)) {
        {
            let mut state = self.inner.state.write();
            f(&mut state);
        }
        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}
