//! Credential attachment and the refresh-and-retry protocol.
//!
//! Every authenticated call goes through [`Dispatcher::dispatch`]:
//!
//! 1. the current access token is attached as a bearer credential;
//! 2. anything but `401 Unauthorized` is returned to the caller untouched;
//! 3. on the first `401` the session is refreshed (one exchange shared by
//!    every request that hit the expiry concurrently) and the request is
//!    replayed once with the new token;
//! 4. if the session cannot be refreshed it is cleared and a
//!    [`SessionSignal::RedirectRequired`] is broadcast.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Response;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::request::PendingRequest;
use super::service::exchange_refresh;
use super::{ApiError, ApiRequest, Transport};
use crate::auth::SessionStore;
use crate::models::{Ack, AuthTokens};

/// Buffer for the signal channel. Signals are rare (one per expiry), so a
/// slow subscriber only needs room for a handful.
const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// Side-channel events for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The session was cleared because it expired; navigate to sign-in
    RedirectRequired { reason: ExpiryReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The access token was rejected and there was no refresh token to renew it
    NoRefreshToken,
    /// The refresh exchange itself failed
    RefreshFailed,
}

/// Refresh exchange shared by every request waiting on it.
/// Resolves to the new access token.
type RefreshHandle = Shared<BoxFuture<'static, Result<String, ApiError>>>;

/// Holds the in-flight refresh. Recovery decisions and refresh commits both
/// happen under this lock, so a request never sees a half-applied refresh.
type RefreshSlot = Arc<Mutex<Option<RefreshHandle>>>;

pub struct Dispatcher {
    transport: Transport,
    store: Arc<SessionStore>,
    signals: broadcast::Sender<SessionSignal>,
    in_flight: RefreshSlot,
}

impl Dispatcher {
    pub fn new(transport: Transport, store: Arc<SessionStore>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            transport,
            store,
            signals,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Receive redirect signals raised when a session expires
    pub fn subscribe_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Send `request` under the credential protocol.
    ///
    /// Public requests are sent as-is. Everything else carries the current
    /// access token and, unless marked `no_refresh`, gets at most one
    /// refresh-and-replay.
    pub async fn dispatch(&self, request: ApiRequest) -> Result<Response, ApiError> {
        if request.public {
            return self.transport.execute(&request, None).await;
        }

        let mut pending = PendingRequest::new(request);
        let mut token = self.store.access_token();

        loop {
            let err = match self.transport.execute(&pending.request, token.as_deref()).await {
                Err(err) if err.is_unauthorized() && pending.request.refreshable => err,
                outcome => return outcome,
            };

            if !pending.claim_retry() {
                debug!(path = %pending.request.path, "Renewed credential rejected, giving up");
                return Err(err);
            }

            let renewed = self.recover(token.as_deref(), err).await?;
            debug!(path = %pending.request.path, "Replaying request with renewed credential");
            token = Some(renewed);
        }
    }

    /// Dispatch and decode the `data` member of the response envelope
    pub async fn dispatch_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.dispatch(request).await?;
        Transport::decode_data(response).await
    }

    /// Dispatch an exchange whose response carries no payload
    pub async fn dispatch_ack(&self, request: ApiRequest) -> Result<Ack, ApiError> {
        let response = self.dispatch(request).await?;
        Transport::decode_ack(response).await
    }

    /// Obtain a usable access token after `sent_token` was rejected with `err`.
    ///
    /// Either replays with a token that rotated meanwhile, joins the refresh
    /// in flight, starts one, or expires the session.
    async fn recover(&self, sent_token: Option<&str>, err: ApiError) -> Result<String, ApiError> {
        let handle = {
            let mut slot = lock_slot(&self.in_flight);

            if let Some(current) = self.store.access_token() {
                if sent_token != Some(current.as_str()) {
                    debug!("Access token rotated while request was in flight");
                    return Ok(current);
                }
            }

            match slot.as_ref() {
                Some(handle) if handle.peek().is_none() => {
                    debug!("Joining in-flight session refresh");
                    handle.clone()
                }
                _ => match self.store.refresh_token() {
                    Some(refresh_token) => {
                        let handle = Self::run_refresh(
                            self.transport.clone(),
                            Arc::clone(&self.store),
                            self.signals.clone(),
                            Arc::clone(&self.in_flight),
                            refresh_token,
                        )
                        .boxed()
                        .shared();
                        *slot = Some(handle.clone());
                        handle
                    }
                    None => {
                        self.expire_without_refresh(sent_token.is_some());
                        return Err(err);
                    }
                },
            }
        };

        let outcome = handle.await;

        let mut slot = lock_slot(&self.in_flight);
        if slot.as_ref().is_some_and(|h| h.peek().is_some()) {
            *slot = None;
        }

        outcome
    }

    /// The refresh exchange and its store side effects.
    /// Runs once per shared handle, however many requests await it.
    async fn run_refresh(
        transport: Transport,
        store: Arc<SessionStore>,
        signals: broadcast::Sender<SessionSignal>,
        slot: RefreshSlot,
        refresh_token: String,
    ) -> Result<String, ApiError> {
        info!("Access token rejected, refreshing session");
        let exchanged = exchange_refresh(&transport, &refresh_token).await;
        Self::commit_refresh(&store, &signals, &slot, exchanged)
    }

    /// Apply a refresh outcome to the store while holding the slot lock.
    fn commit_refresh(
        store: &SessionStore,
        signals: &broadcast::Sender<SessionSignal>,
        slot: &RefreshSlot,
        exchanged: Result<AuthTokens, ApiError>,
    ) -> Result<String, ApiError> {
        let _slot = lock_slot(slot);

        match exchanged {
            Ok(tokens) => {
                let access_token = tokens.access_token.clone();
                store.set_auth(tokens.user, tokens.access_token, tokens.refresh_token)?;
                info!("Session refreshed");
                Ok(access_token)
            }
            Err(err) => {
                warn!(error = %err, "Session refresh failed, signing out");
                if let Err(e) = store.logout() {
                    error!(error = %e, "Failed to clear session after refresh failure");
                }
                Self::raise(signals, ExpiryReason::RefreshFailed);
                Err(err)
            }
        }
    }

    /// Clear a session that cannot be renewed. Called with the slot locked.
    ///
    /// No signal when the request carried a credential from a session that
    /// an earlier expiry already cleared; that expiry raised it.
    fn expire_without_refresh(&self, carried_credential: bool) {
        let cleared = match self.store.logout() {
            Ok(cleared) => cleared,
            Err(e) => {
                error!(error = %e, "Failed to clear expired session");
                true
            }
        };

        if cleared || !carried_credential {
            info!("Access token rejected with no refresh token, signing out");
            Self::raise(&self.signals, ExpiryReason::NoRefreshToken);
        }
    }

    fn raise(signals: &broadcast::Sender<SessionSignal>, reason: ExpiryReason) {
        if signals.send(SessionSignal::RedirectRequired { reason }).is_err() {
            debug!("No subscribers for redirect signal");
        }
    }
}

fn lock_slot(slot: &RefreshSlot) -> MutexGuard<'_, Option<RefreshHandle>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
