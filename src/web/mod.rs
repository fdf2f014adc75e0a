//! Browser front end: upload form, results page, downloads, and login.
//!
//! ## Routes
//!
//! | Method | Path                  | Purpose                                  |
//! |--------|-----------------------|------------------------------------------|
//! | GET    | `/`                   | upload form, or login prompt             |
//! | GET    | `/login`              | redirect to the identity provider        |
//! | GET    | `/callback`           | finish login                             |
//! | GET    | `/logout`             | drop the session                         |
//! | POST   | `/grade`              | run a grading batch (multipart)          |
//! | GET    | `/results`            | last batch of this session               |
//! | GET    | `/results/report.txt` | text report download                     |
//! | GET    | `/results/scores.csv` | CSV download                             |
//! | GET    | `/health`             | liveness                                 |

pub mod auth;
pub mod handlers;
pub mod session;
pub mod views;

use crate::config::GradingConfig;
use crate::error::GraderError;
use auth::{AuthClient, AuthConfig};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use session::SessionStore;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use views::Views;

pub use handlers::*;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default upload limit for one grading request, in MiB.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// Settings for the HTTP server itself.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_mb: usize,
    /// `None` serves without login.
    pub auth: Option<AuthConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            auth: None,
        }
    }
}

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub grading: Arc<GradingConfig>,
    /// `None` when login is disabled.
    pub auth: Option<Arc<AuthClient>>,
    pub sessions: SessionStore,
    pub views: Arc<Views>,
}

impl AppState {
    pub fn new(grading: GradingConfig, auth: Option<AuthConfig>) -> Result<Self, GraderError> {
        let auth = auth
            .map(AuthClient::new)
            .transpose()
            .map_err(|e| GraderError::InvalidConfig(e.to_string()))?
            .map(Arc::new);
        let views = Views::new()
            .map_err(|e| GraderError::Internal(format!("template error: {}", e)))?;
        Ok(Self {
            grading: Arc::new(grading),
            auth,
            sessions: SessionStore::new(),
            views: Arc::new(views),
        })
    }
}

/// Build the router with all endpoints.
pub fn build_router(state: AppState, max_upload_mb: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/grade", post(grade_upload))
        .route("/results", get(results))
        .route("/results/report.txt", get(download_report))
        .route("/results/scores.csv", get(download_scores))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    max_upload_mb: usize,
) -> Result<(), std::io::Error> {
    axum::serve(listener, build_router(state, max_upload_mb)).await
}

/// Bind `server.bind` and serve until the process exits.
pub async fn start_server(server: &ServerConfig, state: AppState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(&server.bind).await?;
    tracing::info!(
        "Serving on http://{} (login {})",
        listener.local_addr()?,
        if state.auth.is_some() { "required" } else { "disabled" }
    );
    serve(listener, state, server.max_upload_mb).await
}
