// API gateway - builds and dispatches requests against the chat service
//
// One configured base endpoint, one reqwest client. If the session store
// holds a token it is attached as a bearer credential; otherwise the request
// goes out unauthenticated. Responses are normalized to parsed JSON. No
// retries: a single network or server failure propagates to the caller
// unchanged, classified by the ApiError taxonomy.
//
// Request assembly (URL, headers, body) is kept separate from dispatch so it
// can be unit-tested without a network.

use crate::error::ApiError;
use crate::session::SessionStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub use reqwest::Method;

/// Seam between the resource layer and the HTTP transport.
///
/// The production implementation is [`ApiClient`]; tests substitute a
/// recording fake to observe exactly which requests an operation issues.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Dispatch a JSON request and resolve to the parsed response body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError>;

    /// Dispatch a form-encoded POST (the token endpoint takes a form).
    async fn request_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<Value, ApiError>;
}

/// HTTP client for the chat service.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    /// Build the client over a base endpoint.
    ///
    /// The timeout is transport-level; the core imposes none of its own.
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Absolute URL for a service path.
    pub fn endpoint_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Assemble a JSON request: URL, optional bearer credential, optional body.
    fn build_json_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, ApiError> {
        let mut builder = self.http.request(method, self.endpoint_url(path));
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    /// Assemble a form-encoded POST request.
    fn build_form_request(
        &self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<reqwest::Request, ApiError> {
        let mut builder = self.http.post(self.endpoint_url(path)).form(fields);
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        builder
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))
    }

    /// Execute a request and classify the outcome.
    async fn dispatch(&self, request: reqwest::Request) -> Result<Value, ApiError> {
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!(%method, %url, status = status.as_u16(), "Request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::trace!(%method, %url, status = status.as_u16(), "Request ok");

        if body.is_empty() {
            // 204-style responses normalize to null
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Gateway for ApiClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let request = self.build_json_request(method, path, body.as_ref())?;
        self.dispatch(request).await
    }

    async fn request_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let request = self.build_form_request(path, fields)?;
        self.dispatch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenPayload;
    use crate::session::TokenStorage;
    use reqwest::header::AUTHORIZATION;

    fn client_with_session() -> (tempfile::TempDir, ApiClient, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("session.token"));
        let session = SessionStore::restore(storage);
        let client = ApiClient::new("http://127.0.0.1:8000/", session.clone()).unwrap();
        (dir, client, session)
    }

    #[test]
    fn test_endpoint_url_joins_base_and_path() {
        let (_dir, client, _session) = client_with_session();
        // Trailing slash on the base is normalized away
        assert_eq!(
            client.endpoint_url("/chats/42/messages"),
            "http://127.0.0.1:8000/chats/42/messages"
        );
        assert_eq!(client.endpoint_url("chats"), "http://127.0.0.1:8000/chats");
    }

    #[test]
    fn test_bearer_attached_when_authenticated() {
        let (_dir, client, session) = client_with_session();
        session.login(&TokenPayload {
            access_token: "tok-T".into(),
            token_type: "bearer".into(),
        });

        let request = client
            .build_json_request(Method::GET, "/users/me", None)
            .unwrap();
        let auth = request.headers().get(AUTHORIZATION).unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer tok-T");
    }

    #[test]
    fn test_no_bearer_when_unauthenticated() {
        let (_dir, client, _session) = client_with_session();
        let request = client
            .build_json_request(Method::GET, "/chats", None)
            .unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_post_body_is_json_encoded() {
        let (_dir, client, session) = client_with_session();
        session.login(&TokenPayload {
            access_token: "tok-T".into(),
            token_type: "bearer".into(),
        });

        let body = serde_json::json!({"text": "hi"});
        let request = client
            .build_json_request(Method::POST, "/chats/42/messages", Some(&body))
            .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(
            request.url().as_str(),
            "http://127.0.0.1:8000/chats/42/messages"
        );
        let bytes = request.body().unwrap().as_bytes().unwrap();
        let sent: Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(sent, body);
    }
}
