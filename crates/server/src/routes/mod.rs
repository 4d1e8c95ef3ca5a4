pub mod auth;
pub mod health;
pub mod organizations;
pub mod profile;
pub mod teams;

use axum::response::{IntoResponse, Redirect, Response};
use rusqlite::Connection;

use teambeat_api::{ServiceError, db};

use crate::authz::{self, Role, Scope};
use crate::error::ApiErr;
use crate::mailer::{Mailer, OutgoingEmail};
use crate::session::{AuthUser, FlashLevel, SessionHandle};
use crate::storage::{self, Db, OrgUserRow, TeamRow, UserRow};
use crate::urls;

/// Queue a flash message and redirect (303).
pub(crate) fn flash_redirect(
    session: &SessionHandle,
    level: FlashLevel,
    text: impl Into<String>,
    to: &str,
) -> Response {
    session.flash(level, text);
    Redirect::to(to).into_response()
}

/// Keep the value of a validation, or record its message for the form.
pub(crate) fn collect<T>(problems: &mut Vec<String>, result: Result<T, ServiceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            problems.push(e.message().to_string());
            None
        }
    }
}

/// Send an email. Failures are logged; the request carries on.
pub(crate) async fn deliver(mailer: &Mailer, db: &Db, email: OutgoingEmail) {
    let kind = email.kind;
    let to = email.to.clone();
    if let Err(e) = mailer.send(db, email).await {
        tracing::warn!(%kind, %to, "email not delivered: {e}");
    }
}

/// [`ApiErr::from_db`] for JSON endpoints.
pub(crate) fn json_db(context: &str) -> impl FnOnce(rusqlite::Error) -> ApiErr + '_ {
    move |e| ApiErr::from_db(context)(e).json()
}

pub(crate) fn load_user(conn: &Connection, user_id: &str) -> Result<UserRow, ApiErr> {
    storage::query_one(conn, db::users::get_by_id(user_id), storage::user_from_row)
        .map_err(ApiErr::from_db("load user"))?
        .ok_or_else(|| ApiErr::unauthorized(crate::gate::LOGIN_REQUIRED))
}

pub(crate) fn load_team(conn: &Connection, team_id: &str) -> Result<TeamRow, ApiErr> {
    storage::query_one(conn, db::teams::get_by_id(team_id), storage::team_from_row)
        .map_err(ApiErr::from_db("load team"))?
        .ok_or_else(|| ApiErr::not_found("Team not found."))
}

/// The session's organization, with the user's active membership in it.
pub(crate) struct OrgContext {
    pub id: String,
    pub name: String,
    pub org_user: OrgUserRow,
}

/// Resolve the selected organization. A stale selection (organization gone,
/// membership deactivated) is dropped from the session.
pub(crate) fn selected_organization(
    conn: &Connection,
    user: &AuthUser,
) -> Result<Option<OrgContext>, ApiErr> {
    let Some(org_id) = user.organization() else {
        return Ok(None);
    };
    let context = organization_context(conn, &org_id, &user.user_id)?;
    if context.is_none() {
        user.session.update(|s| {
            s.organization = None;
            s.current_team_id = None;
        });
    }
    Ok(context)
}

pub(crate) fn organization_context(
    conn: &Connection,
    org_id: &str,
    user_id: &str,
) -> Result<Option<OrgContext>, ApiErr> {
    let name = storage::query_one(conn, db::organizations::get_by_id(org_id), |row| {
        row.get::<_, String>(1)
    })
    .map_err(ApiErr::from_db("load organization"))?;
    let Some(name) = name else {
        return Ok(None);
    };
    let org_user = storage::query_one(
        conn,
        db::organizations::get_org_user(org_id, user_id),
        storage::org_user_from_row,
    )
    .map_err(ApiErr::from_db("load organization user"))?
    .filter(|ou| ou.active);

    Ok(org_user.map(|org_user| OrgContext {
        id: org_id.to_string(),
        name,
        org_user,
    }))
}

/// Selected organization for an org-admin page. The error side is the
/// response to send instead: a redirect to pick an organization, or a 403.
pub(crate) fn require_org_admin(conn: &Connection, user: &AuthUser) -> Result<OrgContext, Response> {
    let org = match selected_organization(conn, user) {
        Ok(Some(org)) => org,
        Ok(None) => return Err(Redirect::to(urls::ORGANIZATION_SELECT.pattern).into_response()),
        Err(e) => return Err(e.into_response()),
    };
    authz::require_role(conn, &user.user_id, Scope::Organization(&org.id), Role::Admin)
        .map_err(IntoResponse::into_response)?;
    Ok(org)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_records_messages() {
        let mut problems = Vec::new();
        let ok: Option<u8> = collect(&mut problems, Ok(1));
        let bad: Option<u8> = collect(
            &mut problems,
            Err(ServiceError::BadRequest("Enter a valid email address.".into())),
        );
        assert_eq!(ok, Some(1));
        assert_eq!(bad, None);
        assert_eq!(problems, vec!["Enter a valid email address.".to_string()]);
    }
}
