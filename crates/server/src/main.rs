mod authz;
mod config;
mod error;
mod gate;
mod mailer;
mod routes;
mod session;
mod storage;
mod tokens;
mod urls;
mod views;

#[cfg(test)]
mod test_support;

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::AppConfig;
use error::ApiErr;
use mailer::Mailer;
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub mailer: Mailer,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Mailer {
    fn from_ref(state: &AppState) -> Self {
        state.mailer.clone()
    }
}

/// Every route from [`urls`], behind the session gate.
pub fn build_router(state: AppState) -> Router {
    use routes::{auth, health, organizations, profile, teams};

    Router::new()
        // Session
        .route(urls::REGISTER.pattern, get(auth::register_page).post(auth::register))
        .route(urls::LOGIN.pattern, get(auth::login_page).post(auth::login))
        .route(
            urls::LOGIN_LINK.pattern,
            get(auth::login_link_page).post(auth::request_login_link),
        )
        .route(urls::LOGOUT.pattern, get(auth::logout))
        .route(
            urls::RESET_PASSWORD.pattern,
            get(auth::reset_password_page).post(auth::reset_password),
        )
        .route(
            urls::RESET_PASSWORD_REQUEST.pattern,
            get(auth::reset_request_page).post(auth::request_password_reset),
        )
        .route(
            urls::PROFILE_RESET_PASSWORD.pattern,
            get(auth::profile_reset_password_page).post(auth::profile_reset_password),
        )
        // Profile
        .route(
            urls::PROFILE.pattern,
            get(profile::profile_page).post(profile::update_profile),
        )
        .route(
            urls::ORGANIZATION_INVITATION.pattern,
            post(profile::answer_invitation),
        )
        // Organizations
        .route(
            urls::ORGANIZATION_CREATE.pattern,
            get(organizations::create_page).post(organizations::create),
        )
        .route(
            urls::ORGANIZATION_SELECT.pattern,
            get(organizations::select_page).post(organizations::select),
        )
        .route(
            urls::ORGANIZATION_ADMIN.pattern,
            get(organizations::admin_dashboard),
        )
        .route(
            urls::ORGANIZATION_ADD_USER.pattern,
            get(organizations::add_user_page).post(organizations::add_user),
        )
        .route(
            urls::ORGANIZATION_ADMIN_API.pattern,
            post(organizations::admin_action),
        )
        // Teams
        .route(urls::DASHBOARD.pattern, get(teams::dashboard))
        .route(urls::DASHBOARD_API.pattern, get(teams::dashboard_api))
        .route(urls::USER_SEARCH_API.pattern, get(teams::user_search_api))
        .route(
            urls::TEAM_CREATE.pattern,
            get(teams::create_page).post(teams::create),
        )
        .route(
            urls::TEAM_STATUS.pattern,
            get(teams::status_page).post(teams::set_status),
        )
        .route(urls::TEAM_LEAD.pattern, get(teams::lead_view))
        .route(urls::TEAM_ADMIN.pattern, get(teams::admin_dashboard))
        .route(urls::TEAM_ADMIN_API.pattern, post(teams::admin_action))
        // Health
        .route(urls::HEALTH.pattern, get(health::health))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .fallback(|| async { ApiErr::not_found(gate::PAGE_NOT_FOUND) })
        .layer(middleware::from_fn_with_state(state.clone(), gate::session_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teambeat_server=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("database: {}", config.database_path.display());

    let db = storage::init_db(&config.database_path)?;
    let purged = session::purge_stale(&db.conn())?;
    tracing::info!(purged, "database initialized");

    if config.middleware_debug {
        tracing::warn!("MIDDLEWARE_DEBUG is on; error responses are not masked");
    }

    tokio::spawn(session::run_purge(db.clone()));

    let mailer = Mailer::from_config(&config);
    let port = config.port;
    let base_url = config.base_url.clone();
    let app = build_router(AppState { db, config, mailer });

    tracing::info!("starting server at {base_url}");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
