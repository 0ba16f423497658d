//! Gatekeeper for protected routes.
//!
//! Every navigation to a protected route calls [`SessionGuard::enter`]. The
//! guard reads the access token's expiry and either grants access, refreshes
//! the pair first, or redirects to the login screen. Components below the
//! route that re-check use [`SessionGuard::check`] and share the evaluation
//! of the navigation that is already running, so one route entry costs at
//! most one refresh call.
//!
//! Refresh calls are serialized: a second evaluation that finds the token
//! expired waits for the first refresh and then re-reads the store instead
//! of spending the same refresh token again.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use payloads::ClientError;
use payloads::responses::TokenPair;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::redirect::{LoginRedirect, Navigator};
use crate::time::TimeSource;
use crate::token::TokenStatus;
use crate::token_store::{ACCESS_TOKEN_KEY, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Valid,
    RefreshPending,
    Expired,
}

/// Outcome of a route entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    Redirect(LoginRedirect),
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

type Evaluation = Shared<BoxFuture<'static, Access>>;

struct Navigation {
    path: String,
    evaluation: Evaluation,
}

struct Inner {
    backend: Arc<dyn Backend>,
    tokens: TokenStore,
    navigator: Arc<dyn Navigator>,
    time_source: TimeSource,
    soft_window: Duration,
    refresh_timeout: Duration,
    state: Mutex<SessionState>,
    navigation: Mutex<Option<Navigation>>,
    refresh_lock: tokio::sync::Mutex<()>,
    background: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<Inner>,
}

impl SessionGuard {
    pub fn new(
        backend: Arc<dyn Backend>,
        tokens: TokenStore,
        navigator: Arc<dyn Navigator>,
        time_source: TimeSource,
        soft_window: Duration,
        refresh_timeout: Duration,
    ) -> Self {
        let state = if tokens.access_token().is_some() {
            SessionState::Valid
        } else {
            SessionState::Unauthenticated
        };
        Self {
            inner: Arc::new(Inner {
                backend,
                tokens,
                navigator,
                time_source,
                soft_window,
                refresh_timeout,
                state: Mutex::new(state),
                navigation: Mutex::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
                background: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.inner.state)
    }

    /// A navigation to `path`. Joins an evaluation of the same path that is
    /// still running, otherwise starts a new one.
    pub async fn enter(&self, path: &str) -> Access {
        let evaluation = {
            let mut navigation = lock(&self.inner.navigation);
            let running = navigation
                .as_ref()
                .filter(|nav| {
                    nav.path == path && nav.evaluation.peek().is_none()
                })
                .map(|nav| nav.evaluation.clone());
            match running {
                Some(evaluation) => evaluation,
                None => {
                    let inner = self.inner.clone();
                    let owned = path.to_string();
                    let evaluation = async move { inner.evaluate(&owned).await }
                        .boxed()
                        .shared();
                    *navigation = Some(Navigation {
                        path: path.to_string(),
                        evaluation: evaluation.clone(),
                    });
                    evaluation
                }
            }
        };
        evaluation.await
    }

    /// Re-check from within the current route. Joins the navigation to the
    /// same path while it is still running; a finished one is not reused,
    /// since the token may have expired since.
    pub async fn check(&self, path: &str) -> Access {
        self.enter(path).await
    }

    /// Store the pair from a successful login.
    pub fn login(&self, pair: &TokenPair) {
        self.inner.tokens.store_pair(pair);
        *lock(&self.inner.navigation) = None;
        self.inner.set_state(SessionState::Valid);
    }

    /// Forget the session. A proactive refresh still running is aborted so
    /// it cannot write tokens back.
    pub fn logout(&self) {
        if let Some(handle) = lock(&self.inner.background).take() {
            handle.abort();
        }
        self.inner.tokens.clear();
        *lock(&self.inner.navigation) = None;
        self.inner.set_state(SessionState::Unauthenticated);
    }

    /// A 401 from any authenticated call: the session is gone.
    pub fn handle_unauthorized(&self, path: &str) -> LoginRedirect {
        tracing::info!(path, "Backend rejected the session");
        self.inner.tokens.clear();
        *lock(&self.inner.navigation) = None;
        self.inner.set_state(SessionState::Unauthenticated);
        let to = LoginRedirect::session_expired(path);
        self.inner.navigator.redirect(&to);
        to
    }

    /// Wait for a proactive refresh, if one is running.
    pub async fn settle(&self) {
        let handle = lock(&self.inner.background).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("Proactive token refresh task failed: {e}");
                }
            }
        }
    }
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn status(&self, access_token: &str) -> TokenStatus {
        self.time_source.token_status(access_token, self.soft_window)
    }

    fn redirect(&self, to: LoginRedirect) -> Access {
        tracing::debug!(%to, "Redirecting to login");
        self.navigator.redirect(&to);
        Access::Redirect(to)
    }

    async fn evaluate(self: &Arc<Self>, path: &str) -> Access {
        let Some(access_token) = self.tokens.access_token() else {
            self.set_state(SessionState::Unauthenticated);
            return self.redirect(LoginRedirect::never_logged_in(path));
        };
        match self.status(&access_token) {
            TokenStatus::Fresh => {
                self.set_state(SessionState::Valid);
                Access::Granted
            }
            TokenStatus::ExpiringSoon => {
                self.set_state(SessionState::Valid);
                self.spawn_background_refresh();
                Access::Granted
            }
            TokenStatus::Expired => self.recover(path, &access_token).await,
        }
    }

    /// The access token is expired: refresh once, or send the user to log
    /// in again.
    async fn recover(&self, path: &str, expired: &str) -> Access {
        self.set_state(SessionState::Expired);
        let _serial = self.refresh_lock.lock().await;

        match self.tokens.access_token() {
            Some(current) if current != expired => {
                if self.status(&current) != TokenStatus::Expired {
                    tracing::debug!("Token was refreshed while waiting");
                    self.set_state(SessionState::Valid);
                    return Access::Granted;
                }
            }
            Some(_) => {}
            None => {
                // a concurrent refresh failed and cleared the session
                self.set_state(SessionState::Unauthenticated);
                return self.redirect(LoginRedirect::session_expired(path));
            }
        }

        let Some(refresh_token) = self.tokens.refresh_token() else {
            self.tokens.remove(ACCESS_TOKEN_KEY);
            self.set_state(SessionState::Unauthenticated);
            return self.redirect(LoginRedirect::session_expired(path));
        };

        self.set_state(SessionState::RefreshPending);
        match self.refresh(&refresh_token).await {
            Ok(pair) => {
                self.tokens.store_pair(&pair);
                self.set_state(SessionState::Valid);
                tracing::info!("Refreshed expired access token");
                Access::Granted
            }
            Err(e) => {
                tracing::info!("Refreshing expired access token failed: {e}");
                self.tokens.clear();
                self.set_state(SessionState::Unauthenticated);
                self.redirect(LoginRedirect::session_expired(path))
            }
        }
    }

    /// A refresh call bounded by the configured timeout.
    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, ClientError> {
        tokio::time::timeout(
            self.refresh_timeout,
            self.backend.refresh_token(refresh_token),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ClientError::NetworkUnavailable(
                "token refresh timed out".into(),
            ))
        })
    }

    fn spawn_background_refresh(self: &Arc<Self>) {
        let mut background = lock(&self.background);
        if background.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let inner = self.clone();
        *background = Some(tokio::spawn(async move {
            inner.background_refresh().await;
        }));
    }

    async fn background_refresh(&self) {
        let _serial = self.refresh_lock.lock().await;
        let Some(refresh_token) = self.tokens.refresh_token() else {
            return;
        };
        match self.refresh(&refresh_token).await {
            // the session may have been replaced while the call was out
            Ok(pair)
                if self.tokens.refresh_token().as_deref()
                    == Some(refresh_token.as_str()) =>
            {
                self.tokens.store_pair(&pair);
                tracing::info!("Refreshed access token ahead of expiry");
            }
            Ok(_) => {
                tracing::debug!("Discarding refresh for a replaced session")
            }
            Err(e) => tracing::warn!("Proactive token refresh failed: {e}"),
        }
    }
}
