//! Cookie-backed server-side sessions.
//!
//! The browser holds a random id; the database holds its SHA-256 and the
//! JSON-encoded [`SessionState`]. The session gate loads the handle before the
//! handler runs and persists it afterwards.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header::COOKIE, request::Parts},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use teambeat_api::{ServiceError, crypto, db, service};

use crate::error::ApiErr;
use crate::storage;

pub const SESSION_COOKIE_NAME: &str = "teambeat_session";

/// Idle lifetime of a session. Older rows are never loaded.
pub const SESSION_TTL_DAYS: i64 = 14;

/// How often the server sweeps idle sessions out of the table.
pub const PURGE_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Info,
    Error,
}

impl FlashLevel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

/// One-shot notice shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

/// Everything the application remembers between requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub authenticated: bool,
    pub user_id: Option<String>,
    /// Selected organization id.
    pub organization: Option<String>,
    pub current_team_id: Option<String>,
    /// Path to return to after logging in.
    pub login_redirect_from: Option<String>,
    pub messages: Vec<FlashMessage>,
}

impl SessionState {
    pub fn log_in(&mut self, user_id: &str) {
        self.authenticated = true;
        self.user_id = Some(user_id.to_string());
        self.organization = None;
        self.current_team_id = None;
    }

    /// Forget the user. Pending messages survive so the login page can show them.
    pub fn log_out(&mut self) {
        let messages = std::mem::take(&mut self.messages);
        *self = Self {
            messages,
            ..Self::default()
        };
    }

    pub fn flash(&mut self, level: FlashLevel, text: impl Into<String>) {
        self.messages.push(FlashMessage {
            level,
            text: text.into(),
        });
    }
}

struct SessionInner {
    token: String,
    state: SessionState,
    /// Cookie must be (re)sent.
    issue_cookie: bool,
    /// A row exists under `token`.
    stored: bool,
    /// Stored row to drop after a rotation.
    stale_hash: Option<String>,
}

/// Shared handle to the current request's session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionInner>>,
}

impl SessionHandle {
    /// Load the session named by the cookie, or start a fresh one when the
    /// cookie is missing, unknown, or idle past [`SESSION_TTL_DAYS`].
    pub fn load(conn: &Connection, token: Option<String>) -> Result<Self, ServiceError> {
        if let Some(token) = token {
            let stored = storage::query_one(
                conn,
                db::sessions::get(&crypto::hash_token(&token), &idle_cutoff()),
                |row| row.get::<_, String>(0),
            )
            .map_err(ServiceError::from_db("load session"))?;

            if let Some(data) = stored {
                let state = serde_json::from_str(&data).unwrap_or_else(|e| {
                    tracing::warn!("discarding unreadable session data: {e}");
                    SessionState::default()
                });
                return Ok(Self::wrap(token, state, true));
            }
        }
        Ok(Self::wrap(new_session_token()?, SessionState::default(), false))
    }

    fn wrap(token: String, state: SessionState, stored: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                token,
                state,
                issue_cookie: !stored,
                stored,
                stale_hash: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        // The state is plain data; a panicking handler cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.lock().state)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.lock().state)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|s| s.authenticated && s.user_id.is_some())
    }

    pub fn flash(&self, level: FlashLevel, text: impl Into<String>) {
        self.update(|s| s.flash(level, text));
    }

    pub fn take_messages(&self) -> Vec<FlashMessage> {
        self.update(|s| std::mem::take(&mut s.messages))
    }

    /// Swap in a new id, keeping the state. Call on privilege changes.
    pub fn rotate(&self) -> Result<(), ServiceError> {
        let token = new_session_token()?;
        let mut inner = self.lock();
        let old = std::mem::replace(&mut inner.token, token);
        if inner.stale_hash.is_none() {
            inner.stale_hash = Some(crypto::hash_token(&old));
        }
        inner.issue_cookie = true;
        inner.stored = false;
        Ok(())
    }

    /// Write the state back. Returns the cookie to send when the id is new.
    /// A new session that was never touched is not stored and gets no cookie.
    pub fn persist(&self, conn: &Connection) -> rusqlite::Result<Option<String>> {
        let mut inner = self.lock();
        if let Some(stale) = inner.stale_hash.take() {
            storage::execute(conn, db::sessions::delete(&stale))?;
        }
        if !inner.stored && inner.state == SessionState::default() {
            return Ok(None);
        }
        let data = serde_json::to_string(&inner.state)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let now = service::to_sqlite_datetime(Utc::now());
        storage::execute(
            conn,
            db::sessions::save(&crypto::hash_token(&inner.token), &data, &now),
        )?;
        inner.stored = true;

        if inner.issue_cookie {
            inner.issue_cookie = false;
            Ok(Some(inner.token.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Drop sessions that have been idle longer than [`SESSION_TTL_DAYS`].
pub fn purge_stale(conn: &Connection) -> rusqlite::Result<usize> {
    storage::execute(conn, db::sessions::delete_stale(&idle_cutoff()))
}

/// Sweep idle sessions every [`PURGE_INTERVAL_SECS`] for the life of the server.
pub async fn run_purge(db: storage::Db) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(PURGE_INTERVAL_SECS));
    // Skip the first immediate tick; startup already purged.
    interval.tick().await;
    loop {
        interval.tick().await;
        match purge_stale(&db.conn()) {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "purged idle sessions"),
            Err(e) => tracing::warn!("session purge failed: {e}"),
        }
    }
}

fn idle_cutoff() -> String {
    service::to_sqlite_datetime(Utc::now() - Duration::days(SESSION_TTL_DAYS))
}

fn new_session_token() -> Result<String, ServiceError> {
    Ok(URL_SAFE_NO_PAD.encode(crypto::random_bytes::<32>()?))
}

/// Build the `Set-Cookie` value for a session id.
pub fn session_cookie(token: &str, secure: bool) -> Option<HeaderValue> {
    let ttl_seconds = SESSION_TTL_DAYS * 24 * 3600;
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

impl<S: Send + Sync> FromRequestParts<S> for SessionHandle {
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or_else(|| ApiErr::internal("session not loaded"))
    }
}

/// Authenticated user extracted from the session.
pub struct AuthUser {
    pub user_id: String,
    pub session: SessionHandle,
}

impl AuthUser {
    pub fn organization(&self) -> Option<String> {
        self.session.read(|s| s.organization.clone())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionHandle::from_request_parts(parts, state).await?;
        let user_id = session
            .read(|s| s.authenticated.then(|| s.user_id.clone()).flatten())
            .ok_or_else(|| {
                ApiErr::unauthorized("You must be authenticated to access this page. Please log in.")
            })?;
        Ok(Self { user_id, session })
    }
}
