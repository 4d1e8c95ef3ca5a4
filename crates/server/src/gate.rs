//! Session gate: the middleware every request passes through.
//!
//! Before the handler it loads the session, enforces the host allow-list,
//! and either lets the request through or redirects it. Afterwards it masks
//! unhandled error responses and persists the session.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::AppState;
use crate::error::{ApiErr, HandledError};
use crate::session::{self, FlashLevel, SessionHandle};
use crate::urls::{self, Route};
use crate::views;

pub const LOGIN_REQUIRED: &str = "You must be authenticated to access this page. Please log in.";
pub const PAGE_NOT_FOUND: &str = "Page not found.";
pub const UNKNOWN_ERROR: &str = "An unknown error occurred.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the handler. `clear_redirect` drops any remembered post-login target.
    Proceed { clear_redirect: bool },
    /// Already logged in; skip the login page.
    RedirectHome,
    RedirectToLogin,
    NotFound,
}

pub fn decide(route: Option<&Route>, authenticated: bool) -> GateDecision {
    let Some(route) = route else {
        return GateDecision::NotFound;
    };
    if route.name == urls::LOGIN.name && authenticated {
        return GateDecision::RedirectHome;
    }
    if route.exempt {
        return GateDecision::Proceed {
            clear_redirect: false,
        };
    }
    if authenticated {
        GateDecision::Proceed {
            clear_redirect: true,
        }
    } else {
        GateDecision::RedirectToLogin
    }
}

pub async fn session_gate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());
    if !state.config.host_allowed(host) {
        tracing::warn!(host = ?host, "rejected request for disallowed host");
        return ApiErr::bad_request("Bad Request").into_response();
    }

    let token = session::extract_session_token(req.headers());
    let loaded = {
        let conn = state.db.conn();
        SessionHandle::load(&conn, token)
    };
    let session = match loaded {
        Ok(session) => session,
        Err(e) => return ApiErr::from(e).into_response(),
    };

    let debug = state.config.middleware_debug;
    let route = urls::resolve(req.uri().path());

    let response = match decide(route, session.is_authenticated()) {
        GateDecision::NotFound if debug => next.run(req).await,
        GateDecision::NotFound => ApiErr::not_found(PAGE_NOT_FOUND).into_response(),
        GateDecision::RedirectHome => Redirect::to(urls::DASHBOARD.pattern).into_response(),
        GateDecision::RedirectToLogin => {
            let requested = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.uri().path().to_string());
            session.update(|s| {
                s.login_redirect_from = Some(requested);
                s.flash(FlashLevel::Error, LOGIN_REQUIRED);
            });
            Redirect::to(urls::LOGIN.pattern).into_response()
        }
        GateDecision::Proceed { clear_redirect } => {
            if clear_redirect {
                session.update(|s| s.login_redirect_from = None);
            }
            req.extensions_mut().insert(session.clone());
            let response = next.run(req).await;
            if debug { response } else { mask_error(response) }
        }
    };

    finish(&state, &session, response)
}

/// Replace unhandled 4xx/5xx responses with the generic error page.
pub fn mask_error(response: Response) -> Response {
    let status = response.status();
    let failed = status.is_client_error() || status.is_server_error();
    if !failed || response.extensions().get::<HandledError>().is_some() {
        return response;
    }
    let message = if status == StatusCode::NOT_FOUND {
        PAGE_NOT_FOUND
    } else {
        UNKNOWN_ERROR
    };
    let mut masked = (status, views::error_page(status, message)).into_response();
    masked.extensions_mut().insert(HandledError);
    masked
}

fn finish(state: &AppState, session: &SessionHandle, mut response: Response) -> Response {
    let persisted = {
        let conn = state.db.conn();
        session.persist(&conn)
    };
    match persisted {
        Ok(Some(token)) => {
            if let Some(cookie) =
                session::session_cookie(&token, state.config.session_cookie_secure)
            {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
        }
        Ok(None) => {}
        Err(e) => return ApiErr::from_db("persist session")(e).into_response(),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestApp, body_string, get, location};
    use axum::body::Body;
    use axum::http::StatusCode;

    /// A form post without a form content type; axum rejects it before the
    /// handler runs, so nothing marks the error as handled.
    fn bare_login_post() -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/login/")
            .body(Body::from("email=a&password=b"))
            .unwrap()
    }

    fn session_rows(app: &TestApp) -> i64 {
        app.state
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM web_sessions", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn decide_follows_exemptions() {
        let login = urls::resolve("/login/");
        let register = urls::resolve("/register/");
        let profile = urls::resolve("/profile/");

        assert_eq!(decide(None, true), GateDecision::NotFound);
        assert_eq!(decide(login, true), GateDecision::RedirectHome);
        assert_eq!(
            decide(login, false),
            GateDecision::Proceed {
                clear_redirect: false
            }
        );
        assert_eq!(
            decide(register, false),
            GateDecision::Proceed {
                clear_redirect: false
            }
        );
        assert_eq!(decide(profile, false), GateDecision::RedirectToLogin);
        assert_eq!(
            decide(profile, true),
            GateDecision::Proceed {
                clear_redirect: true
            }
        );
    }

    #[test]
    fn mask_error_leaves_handled_and_successful_responses() {
        let ok = StatusCode::OK.into_response();
        assert_eq!(mask_error(ok).status(), StatusCode::OK);

        let handled = ApiErr::forbidden("Access denied").into_response();
        assert!(mask_error(handled).extensions().get::<HandledError>().is_some());

        let raw = StatusCode::UNPROCESSABLE_ENTITY.into_response();
        let masked = mask_error(raw);
        assert_eq!(masked.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(masked.extensions().get::<HandledError>().is_some());
    }

    #[tokio::test]
    async fn anonymous_request_is_redirected_with_path_remembered() {
        let app = TestApp::new();
        let response = app.send(get("/team/abc/status/?x=1", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login/");

        let cookie = TestApp::cookie_from(&response).expect("session cookie issued");
        let state = app.session_state(&cookie);
        assert_eq!(state.login_redirect_from.as_deref(), Some("/team/abc/status/?x=1"));

        let page = app.send(get("/login/", Some(&cookie))).await;
        assert_eq!(page.status(), StatusCode::OK);
        assert!(body_string(page).await.contains(LOGIN_REQUIRED));
    }

    #[tokio::test]
    async fn authenticated_user_skips_login_page() {
        let app = TestApp::new();
        let user = app.create_user("ada@example.com", "Ada", "Lovelace");
        let cookie = app.login_cookie(&user);

        let response = app.send(get("/login/", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn unknown_path_renders_not_found_page() {
        let app = TestApp::new();
        let response = app.send(get("/definitely/missing/", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_string(response).await.contains(PAGE_NOT_FOUND));
    }

    #[tokio::test]
    async fn disallowed_host_is_rejected() {
        let app = TestApp::with_config(|config| {
            config.allowed_hosts = vec!["team-beat.app".into()];
        });
        let mut request = get("/login/", None);
        request
            .headers_mut()
            .insert(header::HOST, "evil.example".parse().unwrap());
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut request = get("/login/", None);
        request
            .headers_mut()
            .insert(header::HOST, "team-beat.app".parse().unwrap());
        assert_eq!(app.send(request).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unhandled_errors_are_masked() {
        let app = TestApp::new();
        let response = app.send(bare_login_post()).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body = body_string(response).await;
        assert!(body.contains(UNKNOWN_ERROR));
        assert!(!body.contains("Form requests must have"));
    }

    #[tokio::test]
    async fn debug_mode_shows_raw_errors_but_still_requires_login() {
        let app = TestApp::with_config(|config| config.middleware_debug = true);

        let response = app.send(bare_login_post()).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body = body_string(response).await;
        assert!(!body.contains(UNKNOWN_ERROR));
        assert!(body.contains("Form requests must have"));

        let response = app.send(get("/profile/", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login/");
    }

    #[tokio::test]
    async fn idle_session_must_log_in_again() {
        let app = TestApp::new();
        let user = app.create_user("ada@example.com", "Ada", "Lovelace");
        let cookie = app.login_cookie(&user);
        assert_eq!(
            app.send(get("/profile/", Some(&cookie))).await.status(),
            StatusCode::OK
        );

        app.state
            .db
            .conn()
            .execute("UPDATE web_sessions SET updated_at = '2000-01-01 00:00:00'", [])
            .unwrap();
        let response = app.send(get("/profile/", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login/");
    }

    #[tokio::test]
    async fn cookieless_requests_store_no_sessions() {
        let app = TestApp::new();
        for _ in 0..5 {
            let response = app.send(get("/health", None)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(TestApp::cookie_from(&response).is_none());
        }
        assert_eq!(session_rows(&app), 0);

        // Being bounced to the login page is worth remembering.
        app.send(get("/profile/", None)).await;
        assert_eq!(session_rows(&app), 1);
    }
}
