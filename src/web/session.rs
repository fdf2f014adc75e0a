//! Server-side sessions keyed by a random id in an HttpOnly cookie.
//!
//! Sessions live in memory only: a restart logs everyone out and drops any
//! cached grading results. Sessions idle for longer than the store's TTL are
//! swept whenever a new one is created.

use crate::output::GradingReport;
use crate::web::auth::UserInfo;
use axum::http::{header, HeaderMap};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "autograder_session";

/// How long a session may sit unused before it is dropped.
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Per-browser state.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: Option<UserInfo>,
    /// `state` issued with the last `/authorize` redirect.
    pub oauth_state: Option<String>,
    /// Results of the last grading run, kept for re-renders and downloads.
    pub results: Option<Arc<GradingReport>>,
    /// Last time the session was read or written.
    pub last_seen: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            oauth_state: None,
            results: None,
            last_seen: Instant::now(),
        }
    }
}

/// Shared map of session id → [`Session`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(SESSION_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            idle_ttl,
        }
    }

    /// Start an empty session and return its id, sweeping idle ones first.
    pub async fn create(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let mut sessions = self.inner.write().await;
        let swept = sweep_idle(&mut sessions, self.idle_ttl, Instant::now());
        if swept > 0 {
            debug!("Swept {} idle session(s)", swept);
        }
        sessions.insert(id.clone(), Session::default());
        id
    }

    /// Snapshot of a session, if the id is known. Marks the session as seen.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.inner.write().await;
        let session = sessions.get_mut(id)?;
        session.last_seen = Instant::now();
        Some(session.clone())
    }

    /// Apply `f` to a session; returns `false` when the id is unknown.
    pub async fn update(&self, id: &str, f: impl FnOnce(&mut Session)) -> bool {
        match self.inner.write().await.get_mut(id) {
            Some(session) => {
                f(session);
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Drop every session idle for longer than the TTL; returns how many went.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.inner.write().await;
        sweep_idle(&mut sessions, self.idle_ttl, Instant::now())
    }

    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

fn sweep_idle(sessions: &mut HashMap<String, Session>, ttl: Duration, now: Instant) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) <= ttl);
    before - sessions.len()
}

/// Session id from the request's `Cookie` header(s), if present.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value establishing session `id`.
pub fn session_cookie(id: &str) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that deletes the session cookie.
pub fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
