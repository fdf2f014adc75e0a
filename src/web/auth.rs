//! OAuth2 authorization-code login against Auth0.
//!
//! Four endpoints on `https://{domain}` are used:
//!
//! | Step     | Endpoint        | How                                        |
//! |----------|-----------------|--------------------------------------------|
//! | login    | `/authorize`    | browser redirect with a random `state`     |
//! | callback | `/oauth/token`  | form-encoded POST exchanging the `code`    |
//! | profile  | `/userinfo`     | GET with the access token as bearer        |
//! | logout   | `/v2/logout`    | browser redirect with `returnTo`           |
//!
//! Nothing is retried: any failure is shown to the user, who can start over.

use axum::http::StatusCode;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Scopes requested at `/authorize`.
pub const SCOPES: &str = "openid profile email";

/// Errors from the login flow. Each maps to the HTTP status of the error page.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication setting {0}")]
    NotConfigured(&'static str),

    #[error("Invalid state parameter. Possible CSRF attack.")]
    StateMismatch,

    #[error("No authorization code received from the identity provider")]
    MissingCode,

    /// The provider redirected back with `error=…`.
    #[error("Login was refused: {0}")]
    Denied(String),

    #[error("Token request failed with status code {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    /// 200 response whose JSON carries an `error` field.
    #[error("Authentication error: {0}")]
    TokenRejected(String),

    #[error("Token response did not include an access token")]
    MissingAccessToken,

    #[error("Could not fetch user profile: {0}")]
    UserInfo(String),

    #[error("Identity provider unreachable: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::MissingCode => StatusCode::BAD_REQUEST,
            AuthError::StateMismatch | AuthError::Denied(_) | AuthError::TokenRejected(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::TokenEndpoint { .. }
            | AuthError::MissingAccessToken
            | AuthError::UserInfo(_)
            | AuthError::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Auth0 application settings.
#[derive(Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Tenant domain (`example.us.auth0.com`). A full `http(s)://` base URL
    /// is accepted too.
    pub domain: String,
    pub callback_url: String,
    pub logout_url: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("domain", &self.domain)
            .field("callback_url", &self.callback_url)
            .field("logout_url", &self.logout_url)
            .finish()
    }
}

impl AuthConfig {
    /// Read `AUTH0_CLIENT_ID`, `AUTH0_CLIENT_SECRET`, `AUTH0_DOMAIN`,
    /// `AUTH0_CALLBACK_URL` and `AUTH0_LOGOUT_URL`.
    pub fn from_env() -> Result<Self, AuthError> {
        fn var(key: &'static str) -> Result<String, AuthError> {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(AuthError::NotConfigured(key))
        }
        Ok(Self {
            client_id: var("AUTH0_CLIENT_ID")?,
            client_secret: var("AUTH0_CLIENT_SECRET")?,
            domain: var("AUTH0_DOMAIN")?,
            callback_url: var("AUTH0_CALLBACK_URL")?,
            logout_url: var("AUTH0_LOGOUT_URL")?,
        })
    }

    fn base_url(&self) -> String {
        let domain = self.domain.trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> String {
        let raw = format!("{}{}", self.base_url(), path);
        match Url::parse_with_params(&raw, params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Invalid identity provider URL '{}': {}", raw, e);
                raw
            }
        }
    }

    /// Where to send the browser to log in.
    pub fn authorize_url(&self, state: &str) -> String {
        self.endpoint(
            "/authorize",
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
    }

    /// Where to send the browser after the local session is dropped.
    pub fn logout_redirect(&self) -> String {
        self.endpoint(
            "/v2/logout",
            &[
                ("client_id", self.client_id.as_str()),
                ("returnTo", self.logout_url.as_str()),
            ],
        )
    }
}

/// Profile returned by `/userinfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

impl UserInfo {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("User")
    }
}

/// Talks to the identity provider's back-channel endpoints.
#[derive(Debug, Clone)]
pub struct AuthClient {
    pub config: AuthConfig,
    http: reqwest::Client,
}

impl AuthClient {
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { config, http })
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let url = format!("{}/oauth/token", self.config.base_url());
        debug!("Requesting token from {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: serde_json::Value = response.json().await?;
        if let Some(error) = tokens.get("error").and_then(|e| e.as_str()) {
            let description = tokens
                .get("error_description")
                .and_then(|d| d.as_str())
                .unwrap_or(error);
            return Err(AuthError::TokenRejected(description.to_string()));
        }

        tokens
            .get("access_token")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or(AuthError::MissingAccessToken)
    }

    /// Fetch the logged-in user's profile.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        let url = format!("{}/userinfo", self.config.base_url());
        let response = self.http.get(&url).bearer_auth(access_token).send().await?;
        if !response.status().is_success() {
            return Err(AuthError::UserInfo(format!("status {}", response.status())));
        }
        let user: UserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::UserInfo(e.to_string()))?;
        info!("Logged in: {}", user.display_name());
        Ok(user)
    }

    /// Full callback handling once `state` has been checked.
    pub async fn login(&self, code: &str) -> Result<UserInfo, AuthError> {
        let token = self.exchange_code(code).await?;
        self.fetch_userinfo(&token).await
    }
}

/// Compare the `state` echoed by the provider with the one we issued.
pub fn verify_state(expected: Option<&str>, received: Option<&str>) -> Result<(), AuthError> {
    match (expected, received) {
        (Some(e), Some(r)) if !e.is_empty() && e == r => Ok(()),
        _ => Err(AuthError::StateMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Form,
        http::HeaderMap,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;

    fn config(domain: &str) -> AuthConfig {
        AuthConfig {
            client_id: "client-123".into(),
            client_secret: "s3cret".into(),
            domain: domain.into(),
            callback_url: "http://localhost:8080/callback".into(),
            logout_url: "http://localhost:8080/".into(),
        }
    }

    fn query(url: &str) -> HashMap<String, String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn authorize_url_carries_code_flow_params() {
        let url = config("tenant.auth0.com").authorize_url("abc123");
        assert!(url.starts_with("https://tenant.auth0.com/authorize?"));
        let q = query(&url);
        assert_eq!(q["response_type"], "code");
        assert_eq!(q["client_id"], "client-123");
        assert_eq!(q["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(q["scope"], "openid profile email");
        assert_eq!(q["state"], "abc123");
    }

    #[test]
    fn logout_url_returns_to_app() {
        let url = config("tenant.auth0.com/").logout_redirect();
        assert!(url.starts_with("https://tenant.auth0.com/v2/logout?"));
        let q = query(&url);
        assert_eq!(q["client_id"], "client-123");
        assert_eq!(q["returnTo"], "http://localhost:8080/");
    }

    #[test]
    fn state_must_match_exactly() {
        assert!(verify_state(Some("x1"), Some("x1")).is_ok());
        assert!(matches!(
            verify_state(Some("x1"), Some("x2")),
            Err(AuthError::StateMismatch)
        ));
        assert!(verify_state(None, Some("x1")).is_err());
        assert!(verify_state(Some("x1"), None).is_err());
        assert!(verify_state(Some(""), Some("")).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let dbg = format!("{:?}", config("tenant.auth0.com"));
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn error_statuses() {
        assert_eq!(AuthError::StateMismatch.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::MissingCode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::TokenEndpoint {
                status: 403,
                body: String::new()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    /// Serve a fake tenant on an ephemeral port.
    async fn fake_tenant(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn code_exchange_and_userinfo() {
        let router = Router::new()
            .route(
                "/oauth/token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    if form.get("code").map(String::as_str) == Some("good")
                        && form["grant_type"] == "authorization_code"
                        && form["client_secret"] == "s3cret"
                    {
                        Json(serde_json::json!({ "access_token": "tok-1" }))
                    } else {
                        Json(serde_json::json!({
                            "error": "invalid_grant",
                            "error_description": "Invalid authorization code"
                        }))
                    }
                }),
            )
            .route(
                "/userinfo",
                get(|headers: HeaderMap| async move {
                    let bearer = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let name = if bearer == "Bearer tok-1" { "Ada" } else { "?" };
                    Json(serde_json::json!({ "sub": "auth0|1", "name": name }))
                }),
            );
        let base = fake_tenant(router).await;
        let client = AuthClient::new(config(&base)).unwrap();

        let user = client.login("good").await.unwrap();
        assert_eq!(user.display_name(), "Ada");
        assert_eq!(user.sub, "auth0|1");

        let err = client.login("bad").await.unwrap_err();
        match err {
            AuthError::TokenRejected(msg) => assert_eq!(msg, "Invalid authorization code"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_200_token_response_is_reported() {
        let router = Router::new().route(
            "/oauth/token",
            post(|| async { (StatusCode::FORBIDDEN, "unauthorized_client") }),
        );
        let base = fake_tenant(router).await;
        let client = AuthClient::new(config(&base)).unwrap();

        match client.exchange_code("any").await.unwrap_err() {
            AuthError::TokenEndpoint { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "unauthorized_client");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
