use axum::{
    Form, Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use teambeat_api::{ActionRequest, ActionResponse, TokenPurpose, db, service};

use crate::authz::{self, Role, Scope};
use crate::config::AppConfig;
use crate::error::ApiErr;
use crate::mailer::{self, Mailer, OutgoingEmail};
use crate::routes::{
    OrgContext, collect, deliver, flash_redirect, json_db, load_user, organization_context,
    require_org_admin, selected_organization,
};
use crate::session::{AuthUser, FlashLevel, SessionHandle};
use crate::storage::{self, Db};
use crate::{tokens, urls, views};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateOrganizationForm {
    pub organization_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SelectOrganizationForm {
    pub organization_id: String,
}

/// Names are only used when the address has no account yet.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddUserForm {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Organizations the user actively belongs to: (id, name, is_admin).
fn memberships(conn: &Connection, user_id: &str) -> Result<Vec<(String, String, bool)>, ApiErr> {
    storage::query_all(conn, db::organizations::list_for_user(user_id), |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })
    .map_err(ApiErr::from_db("list organizations"))
}

/// Select the user's organization when they belong to exactly one.
pub(crate) fn auto_select(
    conn: &Connection,
    session: &SessionHandle,
    user_id: &str,
) -> Result<bool, ApiErr> {
    let orgs = memberships(conn, user_id)?;
    let [(org_id, _, _)] = orgs.as_slice() else {
        return Ok(false);
    };
    session.update(|s| {
        s.organization = Some(org_id.clone());
        s.current_team_id = None;
    });
    Ok(true)
}

// ---------------------------------------------------------------------------
// Create / select
// ---------------------------------------------------------------------------

/// GET /organization/create/
pub async fn create_page(user: AuthUser) -> Response {
    create_form(&user.session, "", &[])
}

/// POST /organization/create/ — the creator becomes its first admin.
pub async fn create(
    State(db): State<Db>,
    user: AuthUser,
    Form(form): Form<CreateOrganizationForm>,
) -> Result<Response, ApiErr> {
    let mut problems = Vec::new();
    let name = collect(
        &mut problems,
        service::validate_organization_name(&form.organization_name),
    );
    let mut conn = db.conn();
    if let Some(name) = &name {
        let exists = storage::query_flag(&conn, db::organizations::name_exists(name))
            .map_err(ApiErr::from_db("check organization name"))?;
        if exists {
            problems.push("An organization with this name already exists".into());
        }
    }
    let (Some(name), true) = (name, problems.is_empty()) else {
        return Ok(create_form(&user.session, &form.organization_name, &problems));
    };

    let org_id = Uuid::new_v4().to_string();
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin transaction"))?;
    storage::execute(&tx, db::organizations::insert(&org_id, &name))
        .map_err(ApiErr::from_db("insert organization"))?;
    storage::execute(
        &tx,
        db::organizations::insert_org_user(&Uuid::new_v4().to_string(), &org_id, &user.user_id, true),
    )
    .map_err(ApiErr::from_db("insert organization admin"))?;
    tx.commit().map_err(ApiErr::from_db("commit organization"))?;
    tracing::info!(org_id = %org_id, user_id = %user.user_id, "created organization");

    user.session.update(|s| {
        s.organization = Some(org_id.clone());
        s.current_team_id = None;
    });
    Ok(flash_redirect(
        &user.session,
        FlashLevel::Success,
        format!("Created new organization \"{name}\""),
        urls::ORGANIZATION_ADMIN.pattern,
    ))
}

fn create_form(session: &SessionHandle, name: &str, problems: &[String]) -> Response {
    let fields = format!(
        "{}{}",
        views::errors(problems),
        views::input("Organization name", "organization_name", "text", name)
    );
    let body = format!(
        "<h1>Create a New Organization</h1>{}",
        views::form(urls::ORGANIZATION_CREATE.pattern, &fields, "Submit")
    );
    views::page(session, "Create organization", &body).into_response()
}

/// GET /organization/select/ — pick the working organization. Skipped when
/// there is only one to pick.
pub async fn select_page(State(db): State<Db>, user: AuthUser) -> Result<Response, ApiErr> {
    let conn = db.conn();
    if auto_select(&conn, &user.session, &user.user_id)? {
        return Ok(Redirect::to(urls::DASHBOARD.pattern).into_response());
    }
    let orgs = memberships(&conn, &user.user_id)?;
    drop(conn);

    let create_link = views::link(urls::ORGANIZATION_CREATE.pattern, "Create a new organization");
    let body = if orgs.is_empty() {
        format!(
            "<h1>Organizations</h1><p>You are not part of any organization yet. \
             Accept an invitation from your {} or {}.</p>",
            views::link(urls::PROFILE.pattern, "profile"),
            create_link
        )
    } else {
        let options: Vec<(String, String)> =
            orgs.into_iter().map(|(id, name, _)| (id, name)).collect();
        format!(
            "<h1>Select an organization</h1>{}<p>{}</p>",
            views::form(
                urls::ORGANIZATION_SELECT.pattern,
                &views::select("Organization", "organization_id", &options),
                "Select"
            ),
            create_link
        )
    };
    Ok(views::page(&user.session, "Organizations", &body).into_response())
}

/// POST /organization/select/
pub async fn select(
    State(db): State<Db>,
    user: AuthUser,
    Form(form): Form<SelectOrganizationForm>,
) -> Result<Response, ApiErr> {
    switch_organization(&db, &user, &form.organization_id)
}

/// Point the session at another organization the user belongs to.
pub(crate) fn switch_organization(
    db: &Db,
    user: &AuthUser,
    org_id: &str,
) -> Result<Response, ApiErr> {
    let org = {
        let conn = db.conn();
        organization_context(&conn, org_id, &user.user_id)?
    };
    let Some(org) = org else {
        return Ok(flash_redirect(
            &user.session,
            FlashLevel::Error,
            "Organization not found",
            urls::ORGANIZATION_SELECT.pattern,
        ));
    };
    user.session.update(|s| {
        s.organization = Some(org.id.clone());
        s.current_team_id = None;
    });
    Ok(flash_redirect(
        &user.session,
        FlashLevel::Success,
        format!("Switched to organization \"{}\"", org.name),
        urls::DASHBOARD.pattern,
    ))
}

// ---------------------------------------------------------------------------
// Admin dashboard
// ---------------------------------------------------------------------------

/// GET /organization/admin/ — active users and pending invitations.
pub async fn admin_dashboard(State(db): State<Db>, user: AuthUser) -> Result<Response, ApiErr> {
    let conn = db.conn();
    let org = match require_org_admin(&conn, &user) {
        Ok(org) => org,
        Err(exit) => return Ok(exit),
    };
    user.session.update(|s| s.current_team_id = None);

    let members = storage::query_all(
        &conn,
        db::organizations::list_active_users(&org.id),
        storage::org_member_from_row,
    )
    .map_err(ApiErr::from_db("list organization users"))?;
    let invitations = storage::query_all(
        &conn,
        db::invitations::list_for_organization(&org.id),
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(4)?,
            ))
        },
    )
    .map_err(ApiErr::from_db("list invitations"))?;
    drop(conn);

    let toggle_url = urls::organization_admin_api("toggleisadmin");
    let remove_url = urls::organization_admin_api("removeuser");
    let cancel_url = urls::organization_admin_api("cancelinvitation");

    let member_rows: Vec<Vec<String>> = members
        .iter()
        .map(|m| {
            let actions = if m.org_user_id == org.org_user.id {
                "(you)".to_string()
            } else {
                let toggle_label = if m.is_admin { "Remove admin" } else { "Make admin" };
                format!(
                    "{}{}",
                    views::action_button(&toggle_url, &[("orguser_id", &m.org_user_id)], toggle_label),
                    views::action_button(&remove_url, &[("orguser_id", &m.org_user_id)], "Remove"),
                )
            };
            vec![
                views::escape(&m.display_name()),
                views::escape(&m.email),
                if m.is_admin { "Yes".into() } else { "No".into() },
                actions,
            ]
        })
        .collect();
    let invitation_rows: Vec<Vec<String>> = invitations
        .iter()
        .map(|(id, email, created_at)| {
            vec![
                views::escape(email),
                views::escape(created_at),
                views::action_button(&cancel_url, &[("invitation_id", id)], "Cancel"),
            ]
        })
        .collect();

    let body = format!(
        "<h1>{} administration</h1><p>{} | {}</p><h2>Users</h2>{}<h2>Pending invitations</h2>{}",
        views::escape(&org.name),
        views::link(urls::ORGANIZATION_ADD_USER.pattern, "Add a user"),
        views::link(urls::TEAM_CREATE.pattern, "Create a team"),
        views::table(&["Name", "Email", "Admin", ""], &member_rows),
        views::table(&["Email", "Invited", ""], &invitation_rows),
    );
    Ok(views::page(&user.session, "Organization admin", &body).into_response())
}

// ---------------------------------------------------------------------------
// Invite users
// ---------------------------------------------------------------------------

/// GET /organization/admin/adduser/
pub async fn add_user_page(State(db): State<Db>, user: AuthUser) -> Result<Response, ApiErr> {
    let org = {
        let conn = db.conn();
        match require_org_admin(&conn, &user) {
            Ok(org) => org,
            Err(exit) => return Ok(exit),
        }
    };
    Ok(add_user_form(&user.session, &org, &AddUserForm::default(), &[]))
}

/// POST /organization/admin/adduser/ — invite by email. Unknown addresses
/// get a password-less account and a login link.
pub async fn add_user(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    State(mailer): State<Mailer>,
    user: AuthUser,
    Form(form): Form<AddUserForm>,
) -> Result<Response, ApiErr> {
    let back = user
        .session
        .read(|s| s.current_team_id.clone())
        .map(|team_id| urls::team_admin(&team_id))
        .unwrap_or_else(|| urls::ORGANIZATION_ADMIN.pattern.to_string());

    let (outcome, email) = {
        let mut conn = db.conn();
        let org = match require_org_admin(&conn, &user) {
            Ok(org) => org,
            Err(exit) => return Ok(exit),
        };
        let email = match service::validate_email(&form.email) {
            Ok(email) => email,
            Err(e) => {
                return Ok(add_user_form(&user.session, &org, &form, &[e.message().to_string()]));
            }
        };
        let inviter = load_user(&conn, &user.user_id)?;
        invite(&mut conn, &config, &org, &inviter, &email, &form)?
    };

    if let Some(email) = email {
        deliver(&mailer, &db, email).await;
    }
    let response = match outcome {
        Invite::AlreadyMember => flash_redirect(
            &user.session,
            FlashLevel::Error,
            "This user is already in your organization",
            &back,
        ),
        Invite::AlreadyInvited(name) => flash_redirect(
            &user.session,
            FlashLevel::Success,
            format!("{name} already has an invitation to the organization."),
            &back,
        ),
        Invite::Invited(name) => flash_redirect(
            &user.session,
            FlashLevel::Success,
            format!("Invited {name} to organization"),
            &back,
        ),
        Invite::InvitedToApp(email) => flash_redirect(
            &user.session,
            FlashLevel::Success,
            format!("Invited {email} to TeamBeat for your organization"),
            &back,
        ),
    };
    Ok(response)
}

enum Invite {
    AlreadyMember,
    AlreadyInvited(String),
    Invited(String),
    InvitedToApp(String),
}

fn invite(
    conn: &mut Connection,
    config: &AppConfig,
    org: &OrgContext,
    inviter: &storage::UserRow,
    email: &str,
    form: &AddUserForm,
) -> Result<(Invite, Option<OutgoingEmail>), ApiErr> {
    let existing = storage::query_one(conn, db::users::get_by_email(email), storage::user_from_row)
        .map_err(ApiErr::from_db("find user"))?;

    let Some(invitee) = existing else {
        let user_id = Uuid::new_v4().to_string();
        let tx = conn
            .transaction()
            .map_err(ApiErr::from_db("begin transaction"))?;
        storage::execute(
            &tx,
            db::users::insert(
                &user_id,
                email,
                email,
                form.first_name.trim(),
                form.last_name.trim(),
                None,
            ),
        )
        .map_err(ApiErr::from_db("insert invited user"))?;
        storage::execute(
            &tx,
            db::invitations::insert(&Uuid::new_v4().to_string(), &org.id, &user_id, &inviter.id),
        )
        .map_err(ApiErr::from_db("insert invitation"))?;
        let issued = tokens::issue(&tx, &user_id, TokenPurpose::Login, Utc::now())?;
        tx.commit().map_err(ApiErr::from_db("commit invitation"))?;
        tracing::info!(org_id = %org.id, user_id = %user_id, "invited new user to TeamBeat");

        let link = service::token_link(&config.base_url, TokenPurpose::Login, &issued.value, email);
        let message = mailer::app_invitation_email(email, &inviter.display_name(), &org.name, &link);
        return Ok((Invite::InvitedToApp(email.to_string()), Some(message)));
    };

    let org_user = storage::query_one(
        conn,
        db::organizations::get_org_user(&org.id, &invitee.id),
        storage::org_user_from_row,
    )
    .map_err(ApiErr::from_db("find organization user"))?;
    if org_user.is_some_and(|ou| ou.active) {
        return Ok((Invite::AlreadyMember, None));
    }

    let name = invitee.display_name();
    let invited = storage::query_flag(conn, db::invitations::exists(&org.id, &invitee.id))
        .map_err(ApiErr::from_db("check invitation"))?;
    if invited {
        return Ok((Invite::AlreadyInvited(name), None));
    }

    storage::execute(
        conn,
        db::invitations::insert(&Uuid::new_v4().to_string(), &org.id, &invitee.id, &inviter.id),
    )
    .map_err(ApiErr::from_db("insert invitation"))?;
    tracing::info!(org_id = %org.id, user_id = %invitee.id, "invited user to organization");

    let profile_link = format!("{}{}", config.base_url, urls::PROFILE.pattern);
    let message = mailer::org_invitation_email(
        &invitee.email,
        &inviter.display_name(),
        &org.name,
        &profile_link,
    );
    Ok((Invite::Invited(name), Some(message)))
}

fn add_user_form(
    session: &SessionHandle,
    org: &OrgContext,
    form: &AddUserForm,
    problems: &[String],
) -> Response {
    let fields = [
        views::errors(problems),
        views::input("Email", "email", "email", &form.email),
        views::input("First name (new users only)", "first_name", "text", &form.first_name),
        views::input("Last name (new users only)", "last_name", "text", &form.last_name),
    ]
    .concat();
    let body = format!(
        "<h1>Add a user to organization \"{}\"</h1>{}",
        views::escape(&org.name),
        views::form(urls::ORGANIZATION_ADD_USER.pattern, &fields, "Invite")
    );
    views::page(session, "Add user", &body).into_response()
}

// ---------------------------------------------------------------------------
// Admin actions
// ---------------------------------------------------------------------------

/// POST /organization/admin/api/{action}/ — `removeuser`, `toggleisadmin`,
/// `cancelinvitation`.
pub async fn admin_action(
    State(db): State<Db>,
    user: AuthUser,
    Path(action): Path<String>,
    Form(req): Form<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiErr> {
    let mut conn = db.conn();
    let org = selected_organization(&conn, &user)
        .map_err(ApiErr::json)?
        .ok_or_else(|| ApiErr::bad_request("Select an organization first.").json())?;
    authz::require_role(&conn, &user.user_id, Scope::Organization(&org.id), Role::Admin)
        .map_err(ApiErr::json)?;

    match action.as_str() {
        "removeuser" => {
            let target = org_user_target(&conn, &org, req.orguser_id.as_deref())?;
            let tx = conn
                .transaction()
                .map_err(json_db("begin transaction"))?;
            storage::execute(&tx, db::organizations::set_active(&target.id, false))
                .map_err(json_db("deactivate organization user"))?;
            storage::execute(&tx, db::teams::deactivate_memberships(&target.id))
                .map_err(json_db("deactivate team memberships"))?;
            tx.commit()
                .map_err(json_db("commit removal"))?;
            tracing::info!(org_id = %org.id, org_user_id = %target.id, "removed organization user");
            Ok(Json(ActionResponse::success()))
        }
        "toggleisadmin" => {
            let target = org_user_target(&conn, &org, req.orguser_id.as_deref())?;
            storage::execute(&conn, db::organizations::set_admin(&target.id, !target.is_admin))
                .map_err(json_db("toggle organization admin"))?;
            Ok(Json(ActionResponse::success_with(serde_json::json!({
                "isAdmin": !target.is_admin
            }))))
        }
        "cancelinvitation" => {
            let invitation_id = req
                .invitation_id
                .ok_or_else(|| ApiErr::bad_request("Form error").json())?;
            storage::execute(&conn, db::invitations::delete(&org.id, &invitation_id))
                .map_err(json_db("cancel invitation"))?;
            Ok(Json(ActionResponse::success()))
        }
        _ => Err(ApiErr::bad_request("Unknown action").json()),
    }
}

fn org_user_target(
    conn: &Connection,
    org: &OrgContext,
    org_user_id: Option<&str>,
) -> Result<storage::OrgUserRow, ApiErr> {
    let org_user_id = org_user_id.ok_or_else(|| ApiErr::bad_request("Form error").json())?;
    storage::query_one(
        conn,
        db::organizations::get_org_user_by_id(&org.id, org_user_id),
        storage::org_user_from_row,
    )
    .map_err(json_db("find organization user"))?
    .ok_or_else(|| ApiErr::not_found("User not found").json())
}
