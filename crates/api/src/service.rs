//! Shared business logic — framework-agnostic pure functions.
//!
//! Route handlers call these and keep only the database and HTTP plumbing.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::{ServiceError, StatusColor, TokenPurpose};

// ─── Validation ─────────────────────────────────────────────────────────────

/// Characters that satisfy the "special character" password rule.
pub const SPECIAL_CHARS: &[char] = &[
    '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '~', ';', ':', '<', '>', '"', '?', '/',
    '\'', '[', ']', '|', '\\', '-', '_', '{', '}',
];

/// Validate and normalize an email address. Returns the lowercased, trimmed email.
pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || email.len() > 254 || !email_regex().is_match(&email) {
        return Err(ServiceError::BadRequest("Enter a valid email address.".into()));
    }
    Ok(email)
}

fn email_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|_| unreachable!())
    })
}

/// Every password rule the candidate breaks, in display order.
pub fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < 8 {
        problems.push("Must be at least 8 characters.".to_string());
    }
    if !password.chars().any(char::is_alphabetic) {
        problems.push("Must contain at least one letter.".to_string());
    }
    if !password.chars().any(char::is_numeric) {
        problems.push("Must contain at least one number.".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(&c)) {
        let listed: Vec<String> = SPECIAL_CHARS.iter().map(char::to_string).collect();
        problems.push(format!(
            "Must contain at least one special character ({}).",
            listed.join(", ")
        ));
    }
    problems
}

/// Validate a password against all rules at once.
pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    let problems = password_problems(password);
    if problems.is_empty() {
        return Ok(());
    }
    Err(ServiceError::BadRequest(format!(
        "Invalid password: {}",
        problems.join(" ")
    )))
}

/// Validate and trim a first or last name.
pub fn validate_name(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() || trimmed.chars().count() > 150 {
        return Err(ServiceError::BadRequest(format!(
            "{field} must be 1-150 characters"
        )));
    }
    Ok(trimmed)
}

/// Validate and trim a team name.
pub fn validate_team_name(name: &str) -> Result<String, ServiceError> {
    validate_label("Team name", name)
}

/// Validate and trim an organization name.
pub fn validate_organization_name(name: &str) -> Result<String, ServiceError> {
    validate_label("Organization name", name)
}

fn validate_label(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() || trimmed.chars().count() > 250 {
        return Err(ServiceError::BadRequest(format!(
            "{field} must be 1-250 characters"
        )));
    }
    Ok(trimmed)
}

/// Parse a base URL used for emailed links. Returns it without a trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String, ServiceError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| ServiceError::BadRequest(format!("invalid base url {raw:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ServiceError::BadRequest(format!(
            "base url must be http or https: {raw}"
        )));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

// ─── Timestamps ─────────────────────────────────────────────────────────────

const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC instant the way SQLite's `datetime('now')` does.
pub fn to_sqlite_datetime(at: DateTime<Utc>) -> String {
    at.format(SQLITE_DATETIME).to_string()
}

/// Parse a stored `YYYY-MM-DD HH:MM:SS` timestamp as UTC.
pub fn parse_sqlite_datetime(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Calendar day (UTC) used to key daily statuses.
pub fn status_day(now: DateTime<Utc>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

// ─── Login / reset tokens ───────────────────────────────────────────────────

/// Lifetime of an issued token.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Why a token could not be redeemed. `Display` is the user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("User matching username not found.")]
    UserNotFound,
    #[error("Token not found.")]
    TokenNotFound,
    #[error("Token is expired.")]
    Expired,
}

/// Expiry for a token issued at `now`.
pub fn token_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(TOKEN_TTL_HOURS)
}

/// A token stays valid up to and including its expiry instant.
pub fn check_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), TokenError> {
    if expires_at >= now {
        Ok(())
    } else {
        Err(TokenError::Expired)
    }
}

/// Relative link a token is redeemed at.
pub fn token_path(purpose: TokenPurpose, token: &str, username: &str) -> String {
    let route = match purpose {
        TokenPurpose::Login => "/login/",
        TokenPurpose::Reset => "/resetpassword/",
    };
    format!(
        "{route}?token={}&user={}",
        urlencoding::encode(token),
        urlencoding::encode(username)
    )
}

/// Absolute link for emails.
pub fn token_link(base_url: &str, purpose: TokenPurpose, token: &str, username: &str) -> String {
    format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        token_path(purpose, token, username)
    )
}

/// Replace the value of every `token=` query parameter in `text`, so a copy
/// of an email can be kept without carrying a usable link.
pub fn redact_link_tokens(text: &str) -> std::borrow::Cow<'_, str> {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"([?&]token=)[^&\s]+").unwrap_or_else(|_| unreachable!())
    });
    re.replace_all(text, "${1}[redacted]")
}

// ─── Team status ────────────────────────────────────────────────────────────

/// Roll member statuses up into one team status: any red wins, then any
/// yellow, then green. `None` when nobody reported.
pub fn aggregate_team_status<I>(statuses: I) -> Option<StatusColor>
where
    I: IntoIterator<Item = StatusColor>,
{
    statuses.into_iter().max()
}

// ─── User search ────────────────────────────────────────────────────────────

/// How a free-text user search is matched against organization users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    /// Substring of the email address.
    Email(String),
    /// First word against first names OR the remainder against last names.
    FullName { first: String, last: String },
    /// Substring of either name.
    Name(String),
}

impl SearchTerm {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let term = raw.trim();
        if term.is_empty() {
            return Err(ServiceError::BadRequest("Form error".into()));
        }
        if term.contains('@') {
            return Ok(Self::Email(term.to_string()));
        }
        if let Some((first, last)) = term.split_once(' ') {
            return Ok(Self::FullName {
                first: first.trim().to_string(),
                last: last.trim().to_string(),
            });
        }
        Ok(Self::Name(term.to_string()))
    }
}

/// "First Last", falling back to the email when both names are blank.
pub fn display_name(first_name: &str, last_name: &str, email: &str) -> String {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();
    if full.is_empty() {
        email.to_string()
    } else {
        full.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("  Alice@Example.com ").unwrap(), "alice@example.com");
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email(&format!("{}@example.com", "x".repeat(250))).is_err());
    }

    #[test]
    fn test_password_rules_collect_every_failure() {
        let problems = password_problems("abc");
        assert_eq!(problems.len(), 3);
        assert_eq!(problems[0], "Must be at least 8 characters.");
        assert_eq!(problems[1], "Must contain at least one number.");
        assert!(problems[2].starts_with("Must contain at least one special character (!, @"));

        assert_eq!(
            password_problems("12345678!"),
            vec!["Must contain at least one letter.".to_string()]
        );
        assert!(validate_password("hunter2-hunter2").is_ok());
        assert!(validate_password("password").is_err());
    }

    #[test]
    fn test_validate_labels() {
        assert_eq!(validate_team_name("  Core  ").unwrap(), "Core");
        assert!(validate_team_name("   ").is_err());
        assert!(validate_organization_name(&"x".repeat(251)).is_err());
        assert!(validate_name("First name", "").is_err());
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://team-beat.app/").unwrap(),
            "https://team-beat.app"
        );
        assert!(normalize_base_url("ftp://team-beat.app").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn test_token_expiry_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let expires = token_expiry(now);
        assert_eq!(expires, Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap());
        assert!(check_expiry(expires, now).is_ok());
        assert!(check_expiry(expires, expires).is_ok());
        assert_eq!(
            check_expiry(expires, expires + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_token_error_messages() {
        assert_eq!(
            TokenError::UserNotFound.to_string(),
            "User matching username not found."
        );
        assert_eq!(TokenError::TokenNotFound.to_string(), "Token not found.");
        assert_eq!(TokenError::Expired.to_string(), "Token is expired.");
    }

    #[test]
    fn test_token_links() {
        assert_eq!(
            token_path(TokenPurpose::Login, "ab12", "a@b.co"),
            "/login/?token=ab12&user=a%40b.co"
        );
        assert_eq!(
            token_link("http://localhost:3000/", TokenPurpose::Reset, "ff", "bob"),
            "http://localhost:3000/resetpassword/?token=ff&user=bob"
        );
    }

    #[test]
    fn test_redact_link_tokens() {
        let body = "Log in here:\nhttp://x/login/?token=ab12cd&user=a%40b.co\n";
        assert_eq!(
            redact_link_tokens(body),
            "Log in here:\nhttp://x/login/?token=[redacted]&user=a%40b.co\n"
        );
        assert_eq!(
            redact_link_tokens("http://x/resetpassword/?token=ff"),
            "http://x/resetpassword/?token=[redacted]"
        );
        assert_eq!(redact_link_tokens("no links here"), "no links here");
    }

    #[test]
    fn test_sqlite_datetime_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();
        let raw = to_sqlite_datetime(at);
        assert_eq!(raw, "2024-01-31 23:59:58");
        assert_eq!(parse_sqlite_datetime(&raw), Some(at));
        assert_eq!(parse_sqlite_datetime("yesterday"), None);
        assert_eq!(status_day(at), "2024-01-31");
    }

    #[test]
    fn test_aggregate_team_status() {
        use StatusColor::*;
        assert_eq!(aggregate_team_status([]), None);
        assert_eq!(aggregate_team_status([Green, Green]), Some(Green));
        assert_eq!(aggregate_team_status([Green, Yellow]), Some(Yellow));
        assert_eq!(aggregate_team_status([Yellow, Red, Green]), Some(Red));
    }

    #[test]
    fn test_search_term_parse() {
        assert_eq!(
            SearchTerm::parse("bob@ex").unwrap(),
            SearchTerm::Email("bob@ex".into())
        );
        assert_eq!(
            SearchTerm::parse("Ada Love lace").unwrap(),
            SearchTerm::FullName {
                first: "Ada".into(),
                last: "Love lace".into()
            }
        );
        assert_eq!(SearchTerm::parse(" ada ").unwrap(), SearchTerm::Name("ada".into()));
        assert!(SearchTerm::parse("  ").is_err());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("Ada", "Lovelace", "a@b.co"), "Ada Lovelace");
        assert_eq!(display_name(" ", "", "a@b.co"), "a@b.co");
    }
}
