//! Named route table.
//!
//! The router registers handlers against these patterns, and the session gate
//! resolves incoming paths against the same table to decide exemptions.
//! `{param}` matches one non-empty segment, `{*rest}` matches the remainder.

#[derive(Debug, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub pattern: &'static str,
    /// Reachable without logging in.
    pub exempt: bool,
}

const fn route(name: &'static str, pattern: &'static str) -> Route {
    Route {
        name,
        pattern,
        exempt: false,
    }
}

const fn public(name: &'static str, pattern: &'static str) -> Route {
    Route {
        name,
        pattern,
        exempt: true,
    }
}

pub const DASHBOARD: Route = route("dashboard", "/");
pub const DASHBOARD_API: Route = route("dashboard_api", "/api/dashboard/");
pub const USER_SEARCH_API: Route = route("user_search_api", "/api/users/search/");

pub const REGISTER: Route = public("register", "/register/");
pub const LOGIN: Route = public("login", "/login/");
pub const LOGIN_LINK: Route = public("login_link", "/login/link/");
pub const LOGOUT: Route = route("logout", "/logout/");
pub const RESET_PASSWORD: Route = public("reset_password", "/resetpassword/");
pub const RESET_PASSWORD_REQUEST: Route =
    public("reset_password_request", "/resetpassword/request/");
pub const PROFILE: Route = route("profile", "/profile/");
pub const PROFILE_RESET_PASSWORD: Route =
    route("profile_reset_password", "/profile/resetpassword/");

pub const ORGANIZATION_CREATE: Route = route("organization_create", "/organization/create/");
pub const ORGANIZATION_SELECT: Route = route("organization_select", "/organization/select/");
pub const ORGANIZATION_ADMIN: Route = route("organization_admin", "/organization/admin/");
pub const ORGANIZATION_ADD_USER: Route =
    route("organization_add_user", "/organization/admin/adduser/");
pub const ORGANIZATION_ADMIN_API: Route =
    route("organization_admin_api", "/organization/admin/api/{action}/");
pub const ORGANIZATION_INVITATION: Route = route(
    "organization_invitation",
    "/organization/invitation/{organization_id}/",
);

pub const TEAM_CREATE: Route = route("team_create", "/team/create/");
pub const TEAM_STATUS: Route = route("team_status", "/team/{team_id}/status/");
pub const TEAM_LEAD: Route = route("team_lead", "/team/{team_id}/lead/");
pub const TEAM_ADMIN: Route = route("team_admin", "/team/{team_id}/admin/");
pub const TEAM_ADMIN_API: Route = route("team_admin_api", "/team/{team_id}/admin/api/{action}/");

pub const STATIC: Route = public("static", "/static/{*path}");
pub const HEALTH: Route = public("health", "/health");

pub const ROUTES: &[Route] = &[
    DASHBOARD,
    DASHBOARD_API,
    USER_SEARCH_API,
    REGISTER,
    LOGIN,
    LOGIN_LINK,
    LOGOUT,
    RESET_PASSWORD,
    RESET_PASSWORD_REQUEST,
    PROFILE,
    PROFILE_RESET_PASSWORD,
    ORGANIZATION_CREATE,
    ORGANIZATION_SELECT,
    ORGANIZATION_ADMIN,
    ORGANIZATION_ADD_USER,
    ORGANIZATION_ADMIN_API,
    ORGANIZATION_INVITATION,
    TEAM_CREATE,
    TEAM_STATUS,
    TEAM_LEAD,
    TEAM_ADMIN,
    TEAM_ADMIN_API,
    STATIC,
    HEALTH,
];

/// Find the route a path belongs to.
pub fn resolve(path: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| matches(r.pattern, path))
}

fn matches(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(_)) if p.starts_with("{*") => return true,
            (Some(p), Some(s)) if p.starts_with('{') => {
                if s.is_empty() {
                    return false;
                }
            }
            (Some(p), Some(s)) => {
                if p != s {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

impl Route {
    /// Substitute `{param}` placeholders in order.
    pub fn path(&self, params: &[&str]) -> String {
        let mut params = params.iter();
        self.pattern
            .split('/')
            .map(|segment| {
                if segment.starts_with('{') {
                    params.next().copied().unwrap_or_default().to_string()
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

pub fn team_status(team_id: &str) -> String {
    TEAM_STATUS.path(&[team_id])
}

pub fn team_lead(team_id: &str) -> String {
    TEAM_LEAD.path(&[team_id])
}

pub fn team_admin(team_id: &str) -> String {
    TEAM_ADMIN.path(&[team_id])
}

pub fn team_admin_api(team_id: &str, action: &str) -> String {
    TEAM_ADMIN_API.path(&[team_id, action])
}

pub fn organization_admin_api(action: &str) -> String {
    ORGANIZATION_ADMIN_API.path(&[action])
}

pub fn organization_invitation(organization_id: &str) -> String {
    ORGANIZATION_INVITATION.path(&[organization_id])
}

/// Accept a post-login redirect target only if it stays on this site.
pub fn safe_local_path(candidate: &str) -> Option<&str> {
    let is_local = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.starts_with("/\\");
    is_local.then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_static_and_parameterized_routes() {
        assert_eq!(resolve("/").map(|r| r.name), Some("dashboard"));
        assert_eq!(resolve("/login/").map(|r| r.name), Some("login"));
        assert_eq!(resolve("/login/link/").map(|r| r.name), Some("login_link"));
        assert_eq!(resolve("/team/create/").map(|r| r.name), Some("team_create"));
        assert_eq!(resolve("/team/abc/status/").map(|r| r.name), Some("team_status"));
        assert_eq!(
            resolve("/team/abc/admin/api/addteammember/").map(|r| r.name),
            Some("team_admin_api")
        );
        assert_eq!(resolve("/static/css/site.css").map(|r| r.name), Some("static"));
    }

    #[test]
    fn unknown_paths_do_not_resolve() {
        assert_eq!(resolve("/nope/"), None);
        assert_eq!(resolve("/login"), None);
        assert_eq!(resolve("/team//status/"), None);
        assert_eq!(resolve("/team/abc/status/extra/"), None);
    }

    #[test]
    fn exempt_set_covers_the_public_pages() {
        let exempt: Vec<&str> = ROUTES.iter().filter(|r| r.exempt).map(|r| r.name).collect();
        for name in ["login", "register", "reset_password", "static", "health"] {
            assert!(exempt.contains(&name), "{name} should be exempt");
        }
        assert!(!resolve("/profile/").unwrap().exempt);
    }

    #[test]
    fn builds_paths_from_patterns() {
        assert_eq!(team_status("t1"), "/team/t1/status/");
        assert_eq!(team_admin_api("t1", "removeteamadmin"), "/team/t1/admin/api/removeteamadmin/");
        assert_eq!(organization_admin_api("toggleisadmin"), "/organization/admin/api/toggleisadmin/");
    }

    #[test]
    fn rejects_off_site_redirects() {
        assert_eq!(safe_local_path("/team/t1/status/"), Some("/team/t1/status/"));
        assert_eq!(safe_local_path("//evil.example"), None);
        assert_eq!(safe_local_path("https://evil.example"), None);
    }
}
