//! Request/response exchanges with the Investory authority.
//!
//! Each operation is a single round trip. Retrying after an expired
//! credential is the dispatcher's job, not this module's.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::{ApiError, ApiRequest, Dispatcher, Transport};
use crate::models::{
    Ack, AuthTokens, Availability, EmailVerificationTicket, RegisterRequest, UserProfile, UserProfileUpdate,
};

// ============================================================================
// Endpoints
// ============================================================================

const SESSIONS_PATH: &str = "/auth/sessions";
const CURRENT_SESSION_PATH: &str = "/auth/sessions/current";
const REGISTRATIONS_PATH: &str = "/auth/registrations";
const AVAILABILITY_PATH: &str = "/auth/registrations/availability";
const REFRESH_PATH: &str = "/auth/tokens/refresh";
const EMAIL_VERIFICATIONS_PATH: &str = "/auth/email-verifications";
const FIND_ID_PATH: &str = "/auth/find-id";
const FIND_PASSWORD_PATH: &str = "/auth/find-password";
const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
const PROFILE_PATH: &str = "/users/me";

/// Exchange a refresh token for a new credential set.
///
/// Sent straight through the transport: the refresh call must never itself
/// be intercepted. Any 401 means the refresh token is no longer usable.
pub(crate) async fn exchange_refresh(transport: &Transport, refresh_token: &str) -> Result<AuthTokens, ApiError> {
    let request = ApiRequest::post(REFRESH_PATH)
        .public()
        .json(&json!({ "refreshToken": refresh_token }))?;

    let response = transport
        .execute(&request, None)
        .await
        .map_err(|err| match err {
            ApiError::Unauthorized => ApiError::InvalidRefreshToken,
            other => other,
        })?;

    Transport::decode_data(response).await
}

/// Stateless client for the authority's auth endpoints
#[derive(Clone)]
pub struct SessionService {
    dispatcher: Arc<Dispatcher>,
}

impl SessionService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Sign in with a login id and password
    pub async fn sign_in(&self, login_id: &str, password: &str) -> Result<AuthTokens, ApiError> {
        let request = ApiRequest::post(SESSIONS_PATH)
            .public()
            .json(&json!({ "loginId": login_id, "password": password }))?;

        debug!(login_id, "Signing in");
        self.dispatcher
            .dispatch_json(request)
            .await
            .map_err(|err| match err {
                ApiError::Unauthorized => ApiError::InvalidCredentials,
                other => other,
            })
    }

    /// End the session on the authority. Best-effort: callers clear the
    /// local session regardless of the outcome. An expired credential is not
    /// refreshed just to sign out.
    pub async fn sign_out(&self) -> Result<Ack, ApiError> {
        self.dispatcher
            .dispatch_ack(ApiRequest::delete(CURRENT_SESSION_PATH).no_refresh())
            .await
    }

    /// Create an account.
    /// Fails with `Validation` for rejected fields or `Conflict` for a taken identity.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<Ack, ApiError> {
        let request = ApiRequest::post(REGISTRATIONS_PATH).public().json(registration)?;
        debug!(login_id = %registration.login_id, "Registering account");
        self.dispatcher.dispatch_ack(request).await
    }

    /// Exchange a refresh token for a new credential set
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        exchange_refresh(self.dispatcher.transport(), refresh_token).await
    }

    /// Check whether a login id and/or email are still free
    pub async fn check_availability(
        &self,
        login_id: Option<&str>,
        email: Option<&str>,
    ) -> Result<Availability, ApiError> {
        let mut request = ApiRequest::get(AVAILABILITY_PATH).public();
        if let Some(login_id) = login_id {
            request = request.query("loginId", login_id);
        }
        if let Some(email) = email {
            request = request.query("email", email);
        }
        self.dispatcher.dispatch_json(request).await
    }

    // ===== Email verification =====

    /// Send a verification code to `email`
    pub async fn request_email_verification(&self, email: &str) -> Result<EmailVerificationTicket, ApiError> {
        let request = ApiRequest::post(EMAIL_VERIFICATIONS_PATH)
            .public()
            .json(&json!({ "email": email }))?;
        self.dispatcher.dispatch_json(request).await
    }

    /// Confirm a verification with the code the user received
    pub async fn confirm_email_verification(&self, verification_id: &str, code: &str) -> Result<Ack, ApiError> {
        let request = ApiRequest::put(format!("{}/{}", EMAIL_VERIFICATIONS_PATH, verification_id))
            .public()
            .json(&json!({ "code": code }))?;
        self.dispatcher.dispatch_ack(request).await
    }

    // ===== Account recovery =====

    pub async fn find_id(&self, name: &str, email: &str) -> Result<Ack, ApiError> {
        let request = ApiRequest::post(FIND_ID_PATH)
            .public()
            .json(&json!({ "name": name, "email": email }))?;
        self.dispatcher.dispatch_ack(request).await
    }

    pub async fn find_password(&self, login_id: &str, email: &str) -> Result<Ack, ApiError> {
        let request = ApiRequest::post(FIND_PASSWORD_PATH)
            .public()
            .json(&json!({ "loginId": login_id, "email": email }))?;
        self.dispatcher.dispatch_ack(request).await
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<Ack, ApiError> {
        let request = ApiRequest::post(RESET_PASSWORD_PATH)
            .public()
            .json(&json!({ "token": token, "newPassword": new_password }))?;
        self.dispatcher.dispatch_ack(request).await
    }

    // ===== Profile =====

    /// Fetch the signed-in user's profile
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.dispatcher.dispatch_json(ApiRequest::get(PROFILE_PATH)).await
    }

    /// Update the signed-in user's profile, returning the stored result
    pub async fn update_profile(&self, update: &UserProfileUpdate) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::patch(PROFILE_PATH).json(update)?;
        self.dispatcher.dispatch_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::{MemoryStorage, SessionStore};

    fn service(server: &MockServer) -> SessionService {
        let store = Arc::new(SessionStore::open(Box::new(MemoryStorage::new())));
        let transport = Transport::new(&server.uri(), Duration::from_secs(2)).expect("transport");
        SessionService::new(Arc::new(Dispatcher::new(transport, store)))
    }

    #[tokio::test]
    async fn test_sign_in_rejected_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/sessions"))
            .and(body_json(json!({"loginId": "trader1", "password": "wrong"})))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"code": "A005", "message": "Login failed"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = service(&server)
            .sign_in("trader1", "wrong")
            .await
            .expect_err("rejected");
        assert!(matches!(err, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_refresh_rejected_is_invalid_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/tokens/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"code": "A003", "message": "Invalid token"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = service(&server).refresh("bogus").await.expect_err("rejected");
        assert!(matches!(err, ApiError::InvalidRefreshToken));
        assert!(err.is_session_terminal());
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/registrations"))
            .and(body_json(json!({
                "loginId": "trader1",
                "email": "trader1@example.com",
                "password": "Secr3t!pass",
                "nickname": "Bull",
                "birthYear": 1990
            })))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({"code": "U002", "message": "Login id already in use"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let registration = RegisterRequest {
            login_id: "trader1".to_string(),
            email: "trader1@example.com".to_string(),
            password: "Secr3t!pass".to_string(),
            nickname: "Bull".to_string(),
            gender: None,
            birth_year: Some(1990),
        };

        match service(&server).register(&registration).await {
            Err(ApiError::Conflict { code, .. }) => assert_eq!(code, "U002"),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_success_returns_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/registrations"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"success": true, "message": "Welcome"})))
            .expect(1)
            .mount(&server)
            .await;

        let registration = RegisterRequest {
            login_id: "newbie".to_string(),
            email: "newbie@example.com".to_string(),
            password: "Secr3t!pass".to_string(),
            nickname: "Newbie".to_string(),
            gender: Some("M".to_string()),
            birth_year: None,
        };

        let ack = service(&server).register(&registration).await.expect("registered");
        assert_eq!(ack.message.as_deref(), Some("Welcome"));
    }

    #[tokio::test]
    async fn test_check_availability_sends_only_given_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/registrations/availability"))
            .and(query_param("loginId", "trader1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"loginIdAvailable": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let availability = service(&server)
            .check_availability(Some("trader1"), None)
            .await
            .expect("availability");

        assert_eq!(availability.login_id_available, Some(false));
        assert_eq!(availability.email_available, None);
        assert!(!availability.all_available());
    }

    #[tokio::test]
    async fn test_email_verification_lifecycle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/email-verifications"))
            .and(body_json(json!({"email": "trader1@example.com"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true,
                "data": {"verificationId": "ver-77", "expiresIn": 300}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/auth/email-verifications/ver-77"))
            .and(body_json(json!({"code": "123456"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "message": "Verified"})))
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server);
        let ticket = service
            .request_email_verification("trader1@example.com")
            .await
            .expect("ticket");
        assert_eq!(ticket.verification_id, "ver-77");

        let ack = service
            .confirm_email_verification(&ticket.verification_id, "123456")
            .await
            .expect("verified");
        assert_eq!(ack.message.as_deref(), Some("Verified"));
    }

    #[tokio::test]
    async fn test_reset_password_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/reset-password"))
            .and(body_json(json!({"token": "reset-1", "newPassword": "N3w!pass"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let ack = service(&server)
            .reset_password("reset-1", "N3w!pass")
            .await
            .expect("reset");
        assert!(ack.message.is_none());
    }
}
