//! Wiring of store, dispatcher and service for collaborators.
//!
//! `SessionClient` is what a presentation layer holds: it signs in and out,
//! keeps the profile in the store current, and hands out the dispatcher for
//! every other authenticated call.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::api::{ApiError, ApiRequest, Dispatcher, SessionService, SessionSignal, Transport};
use crate::auth::{Session, SessionStorage, SessionStore};
use crate::config::Config;
use crate::models::{UserProfile, UserProfileUpdate};

pub struct SessionClient {
    store: Arc<SessionStore>,
    dispatcher: Arc<Dispatcher>,
    service: SessionService,
}

impl SessionClient {
    /// Open the configured session storage and rehydrate from it
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = config.session_storage()?;
        Ok(Self::with_storage(config, storage)?)
    }

    pub fn with_storage(config: &Config, storage: Box<dyn SessionStorage>) -> Result<Self, ApiError> {
        let store = Arc::new(SessionStore::open(storage));
        let transport = Transport::new(&config.api_url, config.request_timeout())?;
        Ok(Self::from_parts(store, transport))
    }

    pub fn from_parts(store: Arc<SessionStore>, transport: Transport) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(transport, Arc::clone(&store)));
        let service = SessionService::new(Arc::clone(&dispatcher));
        Self {
            store,
            dispatcher,
            service,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn service(&self) -> &SessionService {
        &self.service
    }

    pub fn session(&self) -> Session {
        self.store.get_session()
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.dispatcher.subscribe_signals()
    }

    /// Sign in and install the issued credentials
    pub async fn login(&self, login_id: &str, password: &str) -> Result<Session, ApiError> {
        let tokens = self.service.sign_in(login_id, password).await?;
        self.store
            .set_auth(tokens.user, tokens.access_token, tokens.refresh_token)?;
        info!(login_id, "Login successful");
        Ok(self.store.get_session())
    }

    /// Sign out on the authority if possible, then clear locally.
    ///
    /// The remote call is best-effort; its failure is logged and the local
    /// session is cleared anyway. No redirect signal is raised.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.store.is_authenticated() {
            if let Err(e) = self.service.sign_out().await {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }
        self.store.logout()?;
        Ok(())
    }

    /// Fetch the profile from the authority and merge it into the session
    pub async fn refresh_profile(&self) -> Result<UserProfile, ApiError> {
        let profile = self.service.fetch_profile().await?;
        self.store.update_user(profile.clone().into())?;
        Ok(profile)
    }

    /// Send a profile update and merge the authority's result into the session
    pub async fn update_profile(&self, update: UserProfileUpdate) -> Result<UserProfile, ApiError> {
        let profile = self.service.update_profile(&update).await?;
        self.store.update_user(profile.clone().into())?;
        Ok(profile)
    }

    /// Send any authenticated request and decode the envelope's data
    pub async fn request_json(&self, request: ApiRequest) -> Result<serde_json::Value, ApiError> {
        self.dispatcher.dispatch_json(request).await
    }
}
