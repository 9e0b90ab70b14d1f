use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

/// An outbound call relative to the API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Public requests carry no credential and are never intercepted.
    pub public: bool,
    /// Whether a 401 may trigger a refresh and replay.
    pub refreshable: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            public: false,
            refreshable: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Mark as an anonymous exchange (sign-in, registration, refresh, recovery)
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Attach the credential but hand a 401 straight back (explicit sign-out)
    pub fn no_refresh(mut self) -> Self {
        self.refreshable = false;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

/// A request on its way through the dispatcher.
///
/// The retry flag lives on the request rather than the dispatcher because
/// several requests may be in flight at once.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub request: ApiRequest,
    retried: bool,
}

impl PendingRequest {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    /// Claim the single retry. Returns false if it was already used.
    pub fn claim_retry(&mut self) -> bool {
        if self.retried {
            false
        } else {
            self.retried = true;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_retry_only_once() {
        let mut pending = PendingRequest::new(ApiRequest::get("/portfolio"));
        assert!(pending.claim_retry());
        assert!(!pending.claim_retry());
        assert!(!pending.claim_retry());
    }

    #[test]
    fn test_builder_collects_query_and_body() {
        let request = ApiRequest::post("/auth/find-id")
            .public()
            .query("lang", "ko")
            .json(&serde_json::json!({"name": "Kim", "email": "kim@example.com"}))
            .expect("body serializes");

        assert_eq!(request.method, Method::POST);
        assert!(request.public);
        assert_eq!(request.query, vec![("lang".to_string(), "ko".to_string())]);
        assert_eq!(request.body.as_ref().and_then(|b| b["name"].as_str()), Some("Kim"));
    }

    #[test]
    fn test_requests_are_refreshable_unless_opted_out() {
        assert!(ApiRequest::get("/users/me").refreshable);
        assert!(!ApiRequest::delete("/auth/sessions/current").no_refresh().refreshable);
    }
}
