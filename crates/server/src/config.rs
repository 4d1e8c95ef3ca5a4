//! Server configuration loaded from environment variables.

use std::path::PathBuf;

use anyhow::Context;
use teambeat_api::service;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Absolute prefix for links sent by email, without a trailing slash.
    pub base_url: String,
    pub database_path: PathBuf,
    pub static_dir: PathBuf,
    /// Accepted `Host` values. Empty accepts any host.
    pub allowed_hosts: Vec<String>,
    pub port: u16,
    /// Pass error responses through untouched instead of rendering the generic page.
    pub middleware_debug: bool,
    pub log_emails: bool,
    pub from_email: String,
    pub sendgrid_api_key: Option<String>,
    pub session_cookie_secure: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            database_path: PathBuf::from("data").join("teambeat.db"),
            static_dir: PathBuf::from("static"),
            allowed_hosts: Vec::new(),
            port: 3000,
            middleware_debug: false,
            log_emails: false,
            from_email: "no-reply@team-beat.app".into(),
            sendgrid_api_key: None,
            session_cookie_secure: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let data_dir = env_var("TEAMBEAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let database_path = env_var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("teambeat.db"));

        let base_url = match env_var("BASE_URL") {
            Some(raw) => service::normalize_base_url(&raw).context("BASE_URL")?,
            None => defaults.base_url,
        };

        let port = match env_var("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => defaults.port,
        };

        let allowed_hosts = env_var("ALLOWED_HOSTS")
            .map(|raw| {
                raw.split(',')
                    .map(|h| h.trim().to_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let sendgrid_api_key = env_var("SENDGRID_API_KEY");
        if sendgrid_api_key.is_none() {
            tracing::warn!("SENDGRID_API_KEY not set; outgoing emails will only be logged");
        }

        Ok(Self {
            base_url,
            database_path,
            static_dir: env_var("TEAMBEAT_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            allowed_hosts,
            port,
            middleware_debug: env_flag("MIDDLEWARE_DEBUG"),
            log_emails: env_flag("LOG_EMAILS"),
            from_email: env_var("FROM_EMAIL").unwrap_or(defaults.from_email),
            sendgrid_api_key,
            session_cookie_secure: env_flag("SESSION_COOKIE_SECURE"),
        })
    }

    /// Check a request's `Host` header (port ignored). A leading `.` in an
    /// allowed entry matches the domain and all its subdomains.
    pub fn host_allowed(&self, host: Option<&str>) -> bool {
        if self.allowed_hosts.is_empty() || self.allowed_hosts.iter().any(|h| h == "*") {
            return true;
        }
        let Some(host) = host else {
            return false;
        };
        let host = host.trim().to_lowercase();
        let name = match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host.as_str(),
        };

        self.allowed_hosts.iter().any(|allowed| {
            if let Some(domain) = allowed.strip_prefix('.') {
                name == domain || name.ends_with(allowed.as_str())
            } else {
                name == allowed.as_str()
            }
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    env_var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
