//! Shared types, error model, and business rules for TeamBeat.
//!
//! Route handlers in `teambeat-server` stay thin: validation, status
//! aggregation, and token rules live in [`service`], SQL lives in [`db`].

use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod db;
pub mod service;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Daily status a team member reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusColor {
    Green,
    Yellow,
    Red,
}

impl StatusColor {
    pub const ALL: [StatusColor; 3] = [Self::Green, Self::Yellow, Self::Red];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }

    /// Text shown next to each choice on the status form.
    pub fn help_text(&self) -> &'static str {
        match self {
            Self::Green => "Everything is good! I have no blockers and can do what I need to do.",
            Self::Yellow => {
                "Not so great, I have some blockers and might not be able to get what I want done."
            }
            Self::Red => "Not good! I have major blockers and cannot get what I need to do done.",
        }
    }
}

impl std::fmt::Display for StatusColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatusColor {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "red" => Ok(Self::Red),
            other => Err(ServiceError::BadRequest(format!("unknown status: {other}"))),
        }
    }
}

/// What a single-use token may be redeemed for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Login,
    Reset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Reset => "reset",
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenPurpose {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Self::Login),
            "reset" => Ok(Self::Reset),
            other => Err(ServiceError::BadRequest(format!("unknown token type: {other}"))),
        }
    }
}

/// Kind of outgoing email, recorded in the email log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    LoginLink,
    PasswordReset,
    OrgInvitation,
    AppInvitation,
}

impl EmailKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::LoginLink => "login_link",
            Self::PasswordReset => "password_reset",
            Self::OrgInvitation => "org_invitation",
            Self::AppInvitation => "app_invitation",
        }
    }
}

impl std::fmt::Display for EmailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Dashboard API ───────────────────────────────────────────────────────────

/// A team the current user administers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminTeamSummary {
    pub team_id: String,
    pub team_name: String,
}

/// A team the current user belongs to, with today's aggregated status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberTeamSummary {
    pub team_id: String,
    pub team_name: String,
    pub status: Option<StatusColor>,
}

/// GET /api/dashboard/ response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub admin_teams: Vec<AdminTeamSummary>,
    pub teams: Vec<MemberTeamSummary>,
}

// ─── User search API ─────────────────────────────────────────────────────────

/// Query string for GET /api/users/search/.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub search_term: String,
}

/// A single organization user matched by a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchHit {
    pub display_name: String,
    pub email: String,
    /// Organization-user id.
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchResponse {
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub search_result: Vec<UserSearchHit>,
}

// ─── Action APIs ─────────────────────────────────────────────────────────────

/// Outcome flag returned by every action endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Error,
}

/// Form body posted to `.../api/{action}/` endpoints. Each action reads the
/// field it needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    /// Organization user to add, promote, or make lead.
    pub user_id: Option<String>,
    pub orguser_id: Option<String>,
    pub invitation_id: Option<String>,
    pub teammember_id: Option<String>,
    pub teamadmin_id: Option<String>,
}

/// `{status, errorMessage?, data?}` envelope for action endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActionResponse {
    pub fn success() -> Self {
        Self {
            status: ActionStatus::Success,
            error_message: None,
            data: None,
        }
    }

    pub fn success_with(data: serde_json::Value) -> Self {
        Self {
            status: ActionStatus::Success,
            error_message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Error,
            error_message: Some(message.into()),
            data: None,
        }
    }
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic error returned by shared business logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }

    /// Build a closure that wraps a DB/IO error as `Internal`.
    pub fn from_db<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| Self::Internal(format!("{context}: {e}"))
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_color_parse_and_display() {
        for color in StatusColor::ALL {
            let parsed: StatusColor = color.as_str().parse().unwrap();
            assert_eq!(parsed, color);
        }
        assert!("blue".parse::<StatusColor>().is_err());
    }

    #[test]
    fn test_action_response_shape() {
        let json = serde_json::to_value(ActionResponse::error("User already in team.")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["errorMessage"], "User already in team.");
        assert!(json.get("data").is_none());

        let json = serde_json::to_value(ActionResponse::success()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success"}));
    }

    #[test]
    fn test_dashboard_response_uses_camel_case() {
        let resp = DashboardResponse {
            admin_teams: vec![AdminTeamSummary {
                team_id: "t1".into(),
                team_name: "Core".into(),
            }],
            teams: vec![MemberTeamSummary {
                team_id: "t1".into(),
                team_name: "Core".into(),
                status: Some(StatusColor::Yellow),
            }],
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["adminTeams"][0]["teamName"], "Core");
        assert_eq!(json["teams"][0]["status"], "yellow");
    }

    #[test]
    fn test_service_error_status_codes() {
        assert_eq!(ServiceError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(ServiceError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ServiceError::Conflict("dup".into()).message(), "dup");
    }
}
