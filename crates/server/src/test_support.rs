//! Router-level test harness: a fresh database per test and helpers to seed
//! users, organizations, and teams behind the real middleware stack.

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use teambeat_api::{crypto, db};

use crate::config::AppConfig;
use crate::mailer::{EmailTransport, Mailer, OutgoingEmail};
use crate::session::{SESSION_COOKIE_NAME, SessionHandle, SessionState};
use crate::storage::{self, UserRow};
use crate::{AppState, build_router};

pub struct TestApp {
    pub state: AppState,
    router: Router,
    outbox: Arc<Mutex<Vec<OutgoingEmail>>>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig {
            database_path: dir.path().join("test.db"),
            static_dir: dir.path().join("static"),
            log_emails: true,
            ..AppConfig::default()
        };
        customize(&mut config);

        let db = storage::init_db(&config.database_path).unwrap();
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let mailer = Mailer::new(
            EmailTransport::Memory(outbox.clone()),
            config.from_email.clone(),
            config.log_emails,
        );
        let state = AppState { db, config, mailer };
        let router = build_router(state.clone());
        Self {
            state,
            router,
            outbox,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Session id from a response's `Set-Cookie`, if one was issued.
    pub fn cookie_from(response: &Response<Body>) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| {
                v.split(';')
                    .next()?
                    .strip_prefix(SESSION_COOKIE_NAME)?
                    .strip_prefix('=')
                    .map(str::to_string)
            })
    }

    pub fn session_state(&self, cookie: &str) -> SessionState {
        let conn = self.state.db.conn();
        SessionHandle::load(&conn, Some(cookie.to_string()))
            .unwrap()
            .read(|s| s.clone())
    }

    fn store_session(&self, state: SessionState) -> String {
        let conn = self.state.db.conn();
        let session = SessionHandle::load(&conn, None).unwrap();
        session.update(|s| *s = state);
        session.persist(&conn).unwrap().unwrap()
    }

    /// Cookie for a logged-in session with no organization selected.
    pub fn login_cookie(&self, user: &UserRow) -> String {
        let mut state = SessionState::default();
        state.log_in(&user.id);
        self.store_session(state)
    }

    pub fn login_cookie_in(&self, user: &UserRow, org_id: &str) -> String {
        let mut state = SessionState::default();
        state.log_in(&user.id);
        state.organization = Some(org_id.to_string());
        self.store_session(state)
    }

    /// Password-less user, like an invited account.
    pub fn create_user(&self, email: &str, first_name: &str, last_name: &str) -> UserRow {
        self.insert_user(email, first_name, last_name, None)
    }

    pub fn create_user_with_password(&self, email: &str, password: &str) -> UserRow {
        let (hash, salt) = crypto::hash_password(password).unwrap();
        self.insert_user(email, "Test", "User", Some((hash.as_str(), salt.as_str())))
    }

    fn insert_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: Option<(&str, &str)>,
    ) -> UserRow {
        let conn = self.state.db.conn();
        let id = Uuid::new_v4().to_string();
        storage::execute(
            &conn,
            db::users::insert(&id, email, email, first_name, last_name, password),
        )
        .unwrap();
        storage::query_one(&conn, db::users::get_by_id(&id), storage::user_from_row)
            .unwrap()
            .unwrap()
    }

    /// Organization with `admin` as its first admin.
    pub fn create_org(&self, name: &str, admin: &UserRow) -> String {
        let id = Uuid::new_v4().to_string();
        storage::execute(&self.state.db.conn(), db::organizations::insert(&id, name)).unwrap();
        self.add_org_user(&id, admin, true);
        id
    }

    pub fn add_org_user(&self, org_id: &str, user: &UserRow, is_admin: bool) -> String {
        let id = Uuid::new_v4().to_string();
        storage::execute(
            &self.state.db.conn(),
            db::organizations::insert_org_user(&id, org_id, &user.id, is_admin),
        )
        .unwrap();
        id
    }

    pub fn org_user_id(&self, org_id: &str, user: &UserRow) -> String {
        storage::query_one(
            &self.state.db.conn(),
            db::organizations::get_org_user(org_id, &user.id),
            storage::org_user_from_row,
        )
        .unwrap()
        .unwrap()
        .id
    }

    pub fn invite(&self, org_id: &str, invitee: &UserRow, inviter: &UserRow) {
        storage::execute(
            &self.state.db.conn(),
            db::invitations::insert(&Uuid::new_v4().to_string(), org_id, &invitee.id, &inviter.id),
        )
        .unwrap();
    }

    pub fn create_team(&self, org_id: &str, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        storage::execute(&self.state.db.conn(), db::teams::insert(&id, name, org_id, None)).unwrap();
        id
    }

    pub fn add_team_member(&self, team_id: &str, org_user_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        storage::execute(
            &self.state.db.conn(),
            db::teams::insert_member(&id, team_id, org_user_id),
        )
        .unwrap();
        id
    }

    pub fn add_team_admin(&self, team_id: &str, org_user_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        storage::execute(
            &self.state.db.conn(),
            db::teams::insert_admin(&id, team_id, org_user_id),
        )
        .unwrap();
        id
    }

    pub fn set_team_lead(&self, team_id: &str, org_user_id: &str) {
        storage::execute(
            &self.state.db.conn(),
            db::teams::set_team_lead(team_id, org_user_id),
        )
        .unwrap();
    }

    /// Messages delivered to `to`, oldest first, links intact.
    pub fn sent(&self, to: &str) -> Vec<OutgoingEmail> {
        self.outbox
            .lock()
            .unwrap()
            .iter()
            .filter(|email| email.to == to)
            .cloned()
            .collect()
    }

    /// `email_log` rows for `to`, newest first: (kind, subject, body).
    pub fn emails(&self, to: &str) -> Vec<(String, String, String)> {
        storage::query_all(
            &self.state.db.conn(),
            db::email_log::list_for_recipient(to, 50),
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap()
    }
}

fn request(method: &str, uri: &str, cookie: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE_NAME}={cookie}"));
    }
    builder
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    request("GET", uri, cookie).body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    request("POST", uri, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
