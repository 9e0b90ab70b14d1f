use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::storage::SessionStorage;
use crate::models::{UserProfile, UserProfileUpdate};

/// Authentication state of this client.
///
/// `is_authenticated` holds exactly when both `user` and `access_token` are
/// present. Constructors keep that true; [`Session::is_consistent`] checks
/// records read back from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn authenticated(user: UserProfile, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
            access_token: Some(access_token),
            refresh_token,
        }
    }

    pub fn is_consistent(&self) -> bool {
        let complete = self.user.is_some() && self.access_token.is_some();
        if self.is_authenticated {
            complete
        } else {
            // An unauthenticated record must not carry credentials
            self.user.is_none() && self.access_token.is_none() && self.refresh_token.is_none()
        }
    }

    /// Whether an expired access token can be renewed without signing in again
    pub fn can_refresh(&self) -> bool {
        self.is_authenticated && self.refresh_token.is_some()
    }
}

/// Single source of truth for the [`Session`].
///
/// Every mutation is persisted before the in-memory state changes, so a
/// failed write leaves both sides as they were. Subscribers are notified
/// through a `watch` channel.
pub struct SessionStore {
    state: watch::Sender<Session>,
    storage: Box<dyn SessionStorage>,
    // Serializes persist + publish so writers never interleave
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Open the store, rehydrating from `storage`.
    ///
    /// A missing, unreadable or inconsistent record yields an empty session.
    /// Unusable records are removed so stale credentials do not linger.
    pub fn open(storage: Box<dyn SessionStorage>) -> Self {
        let session = match storage.load() {
            Ok(Some(session)) if session.is_consistent() => {
                debug!(authenticated = session.is_authenticated, "Session rehydrated");
                session
            }
            Ok(Some(_)) => {
                warn!("Discarding inconsistent persisted session");
                Self::discard(storage.as_ref());
                Session::default()
            }
            Ok(None) => {
                debug!("No persisted session found");
                Session::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load persisted session");
                Self::discard(storage.as_ref());
                Session::default()
            }
        };

        let (state, _) = watch::channel(session);
        Self {
            state,
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn discard(storage: &dyn SessionStorage) {
        if let Err(e) = storage.clear() {
            warn!(error = %e, "Failed to remove unusable session record");
        }
    }

    /// Snapshot of the current session
    pub fn get_session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.borrow().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    /// Receive the session every time it changes
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Replace the session with an authenticated one
    pub fn set_auth(&self, user: UserProfile, access_token: String, refresh_token: Option<String>) -> Result<()> {
        let _guard = self.lock()?;
        let user_id = user.id;
        let session = Session::authenticated(user, access_token, refresh_token);
        self.storage.save(&session)?;
        self.state.send_replace(session);
        info!(user_id, "Session established");
        Ok(())
    }

    /// Merge `update` into the current user.
    /// Returns false, changing nothing, when no one is signed in.
    pub fn update_user(&self, update: UserProfileUpdate) -> Result<bool> {
        let _guard = self.lock()?;
        let mut session = self.get_session();
        let Some(ref mut user) = session.user else {
            debug!("Ignoring profile update without a session");
            return Ok(false);
        };
        user.merge(update);
        self.storage.save(&session)?;
        self.state.send_replace(session);
        Ok(true)
    }

    /// Clear to the empty session.
    /// Returns whether an authenticated session was cleared.
    pub fn logout(&self) -> Result<bool> {
        let _guard = self.lock()?;
        let was_authenticated = self.state.borrow().is_authenticated;
        self.storage.clear()?;
        self.state.send_replace(Session::default());
        if was_authenticated {
            info!("Session cleared");
        }
        Ok(was_authenticated)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;

    fn trader() -> UserProfile {
        UserProfile {
            id: 42,
            login_id: "trader1".to_string(),
            email: "trader1@example.com".to_string(),
            nickname: "Bull".to_string(),
            gender: None,
            birth_year: Some(1990),
            wmti_type: None,
            phone: None,
            profile_image: None,
            level: Some(1),
            experience: Some(0),
            role: Some("USER".to_string()),
        }
    }

    fn open(storage: &MemoryStorage) -> SessionStore {
        SessionStore::open(Box::new(storage.clone()))
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = open(&MemoryStorage::new());
        let session = store.get_session();
        assert!(!session.is_authenticated);
        assert_eq!(session, Session::default());
    }

    #[test]
    fn test_set_auth_populates_everything() {
        let store = open(&MemoryStorage::new());
        store
            .set_auth(trader(), "access-1".to_string(), Some("refresh-1".to_string()))
            .expect("set_auth");

        let session = store.get_session();
        assert!(session.is_authenticated);
        assert_eq!(session.user.as_ref().map(|u| u.id), Some(42));
        assert_eq!(session.access_token.as_deref(), Some("access-1"));
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
        assert!(session.can_refresh());
    }

    #[test]
    fn test_logout_clears_everything() {
        let storage = MemoryStorage::new();
        let store = open(&storage);
        store
            .set_auth(trader(), "access-1".to_string(), Some("refresh-1".to_string()))
            .expect("set_auth");

        assert!(store.logout().expect("logout"));
        let session = store.get_session();
        assert!(!session.is_authenticated);
        assert!(session.user.is_none());
        assert!(session.access_token.is_none());
        assert!(session.refresh_token.is_none());
        assert!(storage.raw().is_none());

        // Second logout has nothing to clear
        assert!(!store.logout().expect("second logout"));
    }

    #[test]
    fn test_update_user_merges_fields() {
        let store = open(&MemoryStorage::new());
        store
            .set_auth(trader(), "access-1".to_string(), None)
            .expect("set_auth");

        let updated = store
            .update_user(UserProfileUpdate {
                wmti_type: Some("APML".to_string()),
                ..Default::default()
            })
            .expect("update_user");

        assert!(updated);
        let user = store.user().expect("user present");
        assert_eq!(user.wmti_type.as_deref(), Some("APML"));
        assert_eq!(user.birth_year, Some(1990));
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
    }

    #[test]
    fn test_update_user_without_session_is_noop() {
        let storage = MemoryStorage::new();
        let store = open(&storage);

        let updated = store
            .update_user(UserProfileUpdate {
                nickname: Some("Ghost".to_string()),
                ..Default::default()
            })
            .expect("update_user");

        assert!(!updated);
        assert!(store.user().is_none());
        assert!(storage.raw().is_none());
    }

    #[test]
    fn test_rehydrate_reproduces_session() {
        let storage = MemoryStorage::new();
        {
            let store = open(&storage);
            store
                .set_auth(trader(), "access-1".to_string(), Some("refresh-1".to_string()))
                .expect("set_auth");
        }

        let reopened = open(&storage);
        assert_eq!(
            reopened.get_session(),
            Session::authenticated(trader(), "access-1".to_string(), Some("refresh-1".to_string()))
        );
    }

    #[test]
    fn test_rehydrate_discards_inconsistent_record() {
        let storage = MemoryStorage::with_record(
            r#"{"isAuthenticated": true, "user": null, "accessToken": null, "refreshToken": "stale"}"#,
        );

        let store = open(&storage);
        assert_eq!(store.get_session(), Session::default());
        assert!(storage.raw().is_none());
    }

    #[test]
    fn test_rehydrate_discards_corrupt_record() {
        let storage = MemoryStorage::with_record("not json at all");

        let store = open(&storage);
        assert!(!store.is_authenticated());
        assert!(storage.raw().is_none());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let store = open(&MemoryStorage::new());
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().expect("sender alive"));

        store
            .set_auth(trader(), "access-1".to_string(), None)
            .expect("set_auth");
        assert!(rx.has_changed().expect("sender alive"));
        assert!(rx.borrow_and_update().is_authenticated);

        store.logout().expect("logout");
        assert!(rx.has_changed().expect("sender alive"));
        assert!(!rx.borrow_and_update().is_authenticated);
    }
}
