use axum::{
    Form, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use teambeat_api::service::{self, SearchTerm};
use teambeat_api::{
    ActionRequest, ActionResponse, ActionStatus, AdminTeamSummary, DashboardResponse,
    MemberTeamSummary, StatusColor, UserSearchHit, UserSearchQuery, UserSearchResponse, db,
};

use crate::authz::{self, Role, Scope};
use crate::error::ApiErr;
use crate::routes::{
    OrgContext, collect, flash_redirect, json_db, load_team, organization_context,
    selected_organization,
};
use crate::session::{AuthUser, FlashLevel, SessionHandle};
use crate::storage::{self, Db, OrgUserRow, TeamRow};
use crate::{urls, views};

const SEARCH_LIMIT: u64 = 20;
const INVALID_FORM: &str = "Could not complete request: invalid form";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateTeamForm {
    pub name: String,
    /// `Y` or `N`.
    pub creator_is_member: String,
    pub creator_is_lead: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatusForm {
    #[serde(rename = "selected-status")]
    pub selected_status: String,
    #[serde(rename = "status-additional-info-team")]
    pub info_for_team: String,
    #[serde(rename = "status-additional-info-lead")]
    pub info_for_lead: String,
}

// ---------------------------------------------------------------------------
// Shared lookups
// ---------------------------------------------------------------------------

fn team_list(conn: &Connection, built: db::Built) -> Result<Vec<(String, String)>, ApiErr> {
    storage::query_all(conn, built, |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(ApiErr::from_db("list teams"))
}

/// Today's roll-up of a team's reported statuses.
fn team_status(conn: &Connection, team_id: &str, day: &str) -> rusqlite::Result<Option<StatusColor>> {
    let reported = storage::query_all(conn, db::statuses::team_statuses(team_id, day), |row| {
        row.get::<_, String>(0)
    })?;
    Ok(service::aggregate_team_status(
        reported.iter().filter_map(|s| s.parse().ok()),
    ))
}

fn status_badge(status: Option<StatusColor>) -> String {
    match status {
        Some(color) => format!("<span class=\"status status-{color}\">{color}</span>"),
        None => "<span class=\"status status-none\">not reported</span>".to_string(),
    }
}

/// Resolve a team in one of the user's organizations and make it the
/// session's current team. The session organization follows the team.
fn team_context(
    conn: &Connection,
    user: &AuthUser,
    team_id: &str,
) -> Result<(OrgContext, TeamRow), ApiErr> {
    let team = load_team(conn, team_id)?;
    let org = organization_context(conn, &team.organization_id, &user.user_id)?
        .ok_or_else(|| ApiErr::not_found("Team not found."))?;
    user.session.update(|s| {
        s.organization = Some(org.id.clone());
        s.current_team_id = Some(team.id.clone());
    });
    Ok((org, team))
}

/// Role-checked [`team_context`].
fn team_with_role(
    conn: &Connection,
    user: &AuthUser,
    team_id: &str,
    role: Role,
) -> Result<(OrgContext, TeamRow), ApiErr> {
    let (org, team) = team_context(conn, user, team_id)?;
    authz::require_role(conn, &user.user_id, Scope::Team(&team.id), role)?;
    Ok((org, team))
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// GET / — teams the user belongs to, administers, or leads
pub async fn dashboard(State(db): State<Db>, user: AuthUser) -> Result<Response, ApiErr> {
    let conn = db.conn();
    let Some(org) = selected_organization(&conn, &user)? else {
        return Ok(Redirect::to(urls::ORGANIZATION_SELECT.pattern).into_response());
    };
    let day = service::status_day(Utc::now());

    let mut member_rows = Vec::new();
    for (team_id, name) in team_list(&conn, db::teams::list_member_teams(&org.id, &user.user_id))? {
        let mine = match storage::query_one(
            &conn,
            db::teams::find_member_for_user(&team_id, &user.user_id),
            |row| row.get::<_, String>(0),
        )
        .map_err(ApiErr::from_db("find membership"))?
        {
            Some(member_id) => storage::query_one(
                &conn,
                db::statuses::get_for_member(&member_id, &day),
                |row| row.get::<_, String>(0),
            )
            .map_err(ApiErr::from_db("load status"))?
            .and_then(|s| s.parse::<StatusColor>().ok()),
            None => None,
        };
        let overall = team_status(&conn, &team_id, &day).map_err(ApiErr::from_db("team status"))?;
        let label = if mine.is_some() { "Update status" } else { "Set status" };
        member_rows.push(vec![
            views::escape(&name),
            status_badge(mine),
            status_badge(overall),
            views::link(&urls::team_status(&team_id), label),
        ]);
    }

    let admin_rows: Vec<Vec<String>> = team_list(&conn, db::teams::list_admin_teams(&org.id, &user.user_id))?
        .into_iter()
        .map(|(team_id, name)| {
            vec![views::link(&urls::team_admin(&team_id), &name)]
        })
        .collect();
    let mut lead_rows = Vec::new();
    for (team_id, name) in team_list(&conn, db::teams::list_lead_teams(&org.id, &user.user_id))? {
        let overall = team_status(&conn, &team_id, &day).map_err(ApiErr::from_db("team status"))?;
        lead_rows.push(vec![
            views::link(&urls::team_lead(&team_id), &name),
            status_badge(overall),
        ]);
    }
    drop(conn);

    let mut body = format!(
        "<h1>{}</h1><p>{}",
        views::escape(&org.name),
        views::link(urls::TEAM_CREATE.pattern, "Create a team")
    );
    if org.org_user.is_admin {
        body.push_str(" | ");
        body.push_str(&views::link(urls::ORGANIZATION_ADMIN.pattern, "Organization admin"));
    }
    body.push_str("</p><h2>My teams</h2>");
    if member_rows.is_empty() {
        body.push_str("<p>You are not a member of any team yet.</p>");
    } else {
        body.push_str(&views::table(&["Team", "My status", "Team status", ""], &member_rows));
    }
    if !lead_rows.is_empty() {
        body.push_str("<h2>Teams I lead</h2>");
        body.push_str(&views::table(&["Team", "Team status"], &lead_rows));
    }
    if !admin_rows.is_empty() {
        body.push_str("<h2>Teams I administer</h2>");
        body.push_str(&views::table(&["Team"], &admin_rows));
    }
    Ok(views::page(&user.session, "Dashboard", &body).into_response())
}

/// GET /api/dashboard/ — JSON summary of the dashboard
pub async fn dashboard_api(
    State(db): State<Db>,
    user: AuthUser,
) -> Result<Json<DashboardResponse>, ApiErr> {
    let conn = db.conn();
    let org = selected_organization(&conn, &user)
        .map_err(ApiErr::json)?
        .ok_or_else(|| ApiErr::bad_request("Select an organization first.").json())?;
    let day = service::status_day(Utc::now());

    let admin_teams = team_list(&conn, db::teams::list_admin_teams(&org.id, &user.user_id))
        .map_err(ApiErr::json)?
        .into_iter()
        .map(|(team_id, team_name)| AdminTeamSummary { team_id, team_name })
        .collect();
    let mut teams = Vec::new();
    for (team_id, team_name) in team_list(&conn, db::teams::list_member_teams(&org.id, &user.user_id))
        .map_err(ApiErr::json)?
    {
        let status = team_status(&conn, &team_id, &day).map_err(json_db("team status"))?;
        teams.push(MemberTeamSummary {
            team_id,
            team_name,
            status,
        });
    }
    Ok(Json(DashboardResponse { admin_teams, teams }))
}

/// GET /api/users/search/?search_term= — active users of the selected
/// organization. A blank term is reported in-band as `Form error`.
pub async fn user_search_api(
    State(db): State<Db>,
    user: AuthUser,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<UserSearchResponse>, ApiErr> {
    let conn = db.conn();
    let org = selected_organization(&conn, &user)
        .map_err(ApiErr::json)?
        .ok_or_else(|| ApiErr::bad_request("Select an organization first.").json())?;

    let term = match SearchTerm::parse(&query.search_term) {
        Ok(term) => term,
        Err(e) => {
            return Ok(Json(UserSearchResponse {
                status: ActionStatus::Error,
                error_message: Some(e.message().to_string()),
                search_result: Vec::new(),
            }));
        }
    };
    let search_result = storage::query_all(
        &conn,
        db::organizations::search(&org.id, &term, SEARCH_LIMIT),
        storage::org_member_from_row,
    )
    .map_err(json_db("search users"))?
    .into_iter()
    .map(|m| UserSearchHit {
        display_name: m.display_name(),
        email: m.email,
        id: m.org_user_id,
    })
    .collect();

    Ok(Json(UserSearchResponse {
        status: ActionStatus::Success,
        error_message: None,
        search_result,
    }))
}

// ---------------------------------------------------------------------------
// Create team
// ---------------------------------------------------------------------------

/// GET /team/create/
pub async fn create_page(State(db): State<Db>, user: AuthUser) -> Result<Response, ApiErr> {
    let selected = {
        let conn = db.conn();
        selected_organization(&conn, &user)?
    };
    if selected.is_none() {
        return Ok(Redirect::to(urls::ORGANIZATION_SELECT.pattern).into_response());
    }
    Ok(create_form(&user.session, &CreateTeamForm::default(), &[]))
}

/// POST /team/create/ — the creator always becomes a team admin.
pub async fn create(
    State(db): State<Db>,
    user: AuthUser,
    Form(form): Form<CreateTeamForm>,
) -> Result<Response, ApiErr> {
    let mut conn = db.conn();
    let Some(org) = selected_organization(&conn, &user)? else {
        return Ok(Redirect::to(urls::ORGANIZATION_SELECT.pattern).into_response());
    };

    let mut problems = Vec::new();
    let name = collect(&mut problems, service::validate_team_name(&form.name));
    if let Some(name) = &name {
        let exists = storage::query_flag(&conn, db::teams::name_exists(&org.id, name))
            .map_err(ApiErr::from_db("check team name"))?;
        if exists {
            problems.push("A team with this name already exists in this organization.".into());
        }
    }
    let (Some(name), true) = (name, problems.is_empty()) else {
        drop(conn);
        return Ok(create_form(&user.session, &form, &problems));
    };

    let creator = &org.org_user.id;
    let team_id = Uuid::new_v4().to_string();
    let lead = (form.creator_is_lead == "Y").then_some(creator.as_str());
    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin transaction"))?;
    storage::execute(&tx, db::teams::insert(&team_id, &name, &org.id, lead))
        .map_err(ApiErr::from_db("insert team"))?;
    if form.creator_is_member == "Y" {
        storage::execute(
            &tx,
            db::teams::insert_member(&Uuid::new_v4().to_string(), &team_id, creator),
        )
        .map_err(ApiErr::from_db("insert team member"))?;
    }
    storage::execute(
        &tx,
        db::teams::insert_admin(&Uuid::new_v4().to_string(), &team_id, creator),
    )
    .map_err(ApiErr::from_db("insert team admin"))?;
    tx.commit().map_err(ApiErr::from_db("commit team"))?;
    tracing::info!(team_id = %team_id, org_id = %org.id, "created team");

    Ok(flash_redirect(
        &user.session,
        FlashLevel::Success,
        format!("Team \"{name}\" created"),
        urls::DASHBOARD.pattern,
    ))
}

fn create_form(session: &SessionHandle, form: &CreateTeamForm, problems: &[String]) -> Response {
    let yes_no = [("Y", "Yes", ""), ("N", "No", "")];
    let choice = |raw: &str| Some(if raw == "Y" { "Y" } else { "N" });
    let fields = [
        views::errors(problems),
        views::input("Team name", "name", "text", &form.name),
        "<p>Are you a member of this team? You will be asked for your daily status.</p>".to_string(),
        views::radio_group("creator_is_member", &yes_no, choice(&form.creator_is_member)),
        "<p>Are you the Team Lead of this team? You will see daily status updates.</p>".to_string(),
        views::radio_group("creator_is_lead", &yes_no, choice(&form.creator_is_lead)),
    ]
    .concat();
    let body = format!(
        "<h1>Create a Team</h1><p>You will automatically be set as an admin of any teams you \
         create. You can add other admins and remove yourself later.</p>{}",
        views::form(urls::TEAM_CREATE.pattern, &fields, "Create Team")
    );
    views::page(session, "Create team", &body).into_response()
}

// ---------------------------------------------------------------------------
// Daily status
// ---------------------------------------------------------------------------

/// The caller's active membership row in a team.
fn my_member_id(conn: &Connection, team_id: &str, user_id: &str) -> Result<String, ApiErr> {
    storage::query_one(conn, db::teams::find_member_for_user(team_id, user_id), |row| row.get(0))
        .map_err(ApiErr::from_db("find membership"))?
        .ok_or_else(|| {
            ApiErr::forbidden(authz::denied_message(Scope::Team(team_id), Role::Member))
        })
}

type StoredStatus = (String, Option<String>, Option<String>);

fn todays_status(conn: &Connection, member_id: &str, day: &str) -> Result<Option<StoredStatus>, ApiErr> {
    storage::query_one(conn, db::statuses::get_for_member(member_id, day), |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })
    .map_err(ApiErr::from_db("load status"))
}

/// GET /team/{team_id}/status/
pub async fn status_page(
    State(db): State<Db>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Response, ApiErr> {
    let (team, existing) = {
        let conn = db.conn();
        let (_, team) = team_context(&conn, &user, &team_id)?;
        let member_id = my_member_id(&conn, &team.id, &user.user_id)?;
        let existing = todays_status(&conn, &member_id, &service::status_day(Utc::now()))?;
        (team, existing)
    };
    let form = existing
        .map(|(status, team_info, lead_info)| StatusForm {
            selected_status: status,
            info_for_team: team_info.unwrap_or_default(),
            info_for_lead: lead_info.unwrap_or_default(),
        })
        .unwrap_or_default();
    Ok(status_form(&user.session, &team, &form, &[]))
}

/// POST /team/{team_id}/status/ — one status per member per day; posting
/// again overwrites today's entry.
pub async fn set_status(
    State(db): State<Db>,
    user: AuthUser,
    Path(team_id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Response, ApiErr> {
    let conn = db.conn();
    let (_, team) = team_context(&conn, &user, &team_id)?;
    let member_id = my_member_id(&conn, &team.id, &user.user_id)?;

    let Ok(status) = form.selected_status.parse::<StatusColor>() else {
        drop(conn);
        return Ok(status_form(&user.session, &team, &form, &["Select a status.".to_string()]));
    };
    let now = Utc::now();
    let day = service::status_day(now);
    let first_today = todays_status(&conn, &member_id, &day)?.is_none();
    let note = |raw: &str| Some(raw.trim()).filter(|s| !s.is_empty()).map(str::to_string);
    let (info_for_team, info_for_lead) = (note(&form.info_for_team), note(&form.info_for_lead));

    storage::execute(
        &conn,
        db::statuses::upsert(
            &Uuid::new_v4().to_string(),
            &member_id,
            &day,
            status.as_str(),
            info_for_team.as_deref(),
            info_for_lead.as_deref(),
            &service::to_sqlite_datetime(now),
        ),
    )
    .map_err(ApiErr::from_db("save status"))?;
    tracing::info!(team_id = %team.id, member_id = %member_id, %status, "status reported");

    let message = if first_today {
        format!("Thank you for setting your {} status!", team.name)
    } else {
        format!("Your {} status for today has been updated", team.name)
    };
    Ok(flash_redirect(
        &user.session,
        FlashLevel::Success,
        message,
        urls::DASHBOARD.pattern,
    ))
}

fn status_form(session: &SessionHandle, team: &TeamRow, form: &StatusForm, problems: &[String]) -> Response {
    let choices: Vec<(&str, &str, &str)> = StatusColor::ALL
        .iter()
        .map(|c| (c.as_str(), c.as_str(), c.help_text()))
        .collect();
    let selected = Some(form.selected_status.as_str()).filter(|s| !s.is_empty());
    let fields = [
        views::errors(problems),
        views::radio_group("selected-status", &choices, selected),
        views::textarea(
            "Anything the team should know?",
            "status-additional-info-team",
            &form.info_for_team,
        ),
        views::textarea(
            "Anything only the team lead should know?",
            "status-additional-info-lead",
            &form.info_for_lead,
        ),
    ]
    .concat();
    let body = format!(
        "<h1>How are things today?</h1><h2>{}</h2>{}",
        views::escape(&team.name),
        views::form(&urls::team_status(&team.id), &fields, "Submit")
    );
    views::page(session, "Set status", &body).into_response()
}

// ---------------------------------------------------------------------------
// Team lead view
// ---------------------------------------------------------------------------

/// GET /team/{team_id}/lead/ — today's statuses including lead-only notes
pub async fn lead_view(
    State(db): State<Db>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Response, ApiErr> {
    let day = service::status_day(Utc::now());
    let (team, rows, overall) = {
        let conn = db.conn();
        let (_, team) = team_with_role(&conn, &user, &team_id, Role::Lead)?;
        let rows = storage::query_all(&conn, db::statuses::list_for_team(&team.id, &day), |row| {
            Ok((
                service::display_name(
                    &row.get::<_, String>(2)?,
                    &row.get::<_, String>(3)?,
                    &row.get::<_, String>(1)?,
                ),
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .map_err(ApiErr::from_db("list statuses"))?;
        let overall = team_status(&conn, &team.id, &day).map_err(ApiErr::from_db("team status"))?;
        (team, rows, overall)
    };

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|(name, status, team_info, lead_info)| {
            vec![
                views::escape(name),
                status_badge(status.as_deref().and_then(|s| s.parse().ok())),
                views::escape(team_info.as_deref().unwrap_or_default()),
                views::escape(lead_info.as_deref().unwrap_or_default()),
            ]
        })
        .collect();
    let body = format!(
        "<h1>{} status for {day}</h1><p>Team status: {}</p>{}",
        views::escape(&team.name),
        status_badge(overall),
        views::table(&["Member", "Status", "For the team", "For the lead"], &cells)
    );
    Ok(views::page(&user.session, "Team status", &body).into_response())
}

// ---------------------------------------------------------------------------
// Team admin
// ---------------------------------------------------------------------------

/// GET /team/{team_id}/admin/ — members, admins, and lead of a team
pub async fn admin_dashboard(
    State(db): State<Db>,
    user: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Response, ApiErr> {
    let conn = db.conn();
    let (org, team) = team_with_role(&conn, &user, &team_id, Role::Admin)?;
    let members = storage::query_all(&conn, db::teams::list_members(&team.id), storage::team_person_from_row)
        .map_err(ApiErr::from_db("list team members"))?;
    let admins = storage::query_all(&conn, db::teams::list_admins(&team.id), storage::team_person_from_row)
        .map_err(ApiErr::from_db("list team admins"))?;
    let org_users = storage::query_all(
        &conn,
        db::organizations::list_active_users(&org.id),
        storage::org_member_from_row,
    )
    .map_err(ApiErr::from_db("list organization users"))?;
    drop(conn);

    let api = |action: &str| urls::team_admin_api(&team.id, action);
    let lead = team
        .team_lead_id
        .as_deref()
        .and_then(|id| org_users.iter().find(|m| m.org_user_id == id))
        .map(|m| views::escape(&m.display_name()))
        .unwrap_or_else(|| "No team lead".to_string());

    let member_rows: Vec<Vec<String>> = members
        .iter()
        .map(|m| {
            vec![
                views::escape(&m.display_name()),
                views::escape(&m.email),
                views::action_button(&api("removeteammember"), &[("teammember_id", &m.id)], "Remove"),
            ]
        })
        .collect();
    let admin_rows: Vec<Vec<String>> = admins
        .iter()
        .map(|a| {
            let action = if a.org_user_id == org.org_user.id {
                "(you)".to_string()
            } else {
                views::action_button(&api("removeteamadmin"), &[("teamadmin_id", &a.id)], "Remove")
            };
            vec![views::escape(&a.display_name()), views::escape(&a.email), action]
        })
        .collect();

    let options: Vec<(String, String)> = org_users
        .iter()
        .map(|m| (m.org_user_id.clone(), format!("{} <{}>", m.display_name(), m.email)))
        .collect();
    let picker = |action: &str, submit: &str| {
        views::action_form(&api(action), &views::select("User", "user_id", &options), submit)
    };

    let mut body = format!(
        "<h1>{} administration</h1><h2>Team lead</h2><p>{lead}</p>{}",
        views::escape(&team.name),
        picker("changeteamlead", "Change team lead"),
    );
    body.push_str("<h2>Members</h2>");
    body.push_str(&views::table(&["Name", "Email", ""], &member_rows));
    body.push_str(&picker("addteammember", "Add member"));
    body.push_str("<h2>Admins</h2>");
    body.push_str(&views::table(&["Name", "Email", ""], &admin_rows));
    body.push_str(&picker("addteamadmin", "Add admin"));
    if org.org_user.is_admin {
        body.push_str(&format!(
            "<p>{}</p>",
            views::link(urls::ORGANIZATION_ADD_USER.pattern, "Invite someone to the organization")
        ));
    }
    Ok(views::page(&user.session, "Team admin", &body).into_response())
}

/// Active organization user named by a form's `user_id`.
fn org_user_target(conn: &Connection, org: &OrgContext, user_id: Option<&str>) -> Result<OrgUserRow, ApiErr> {
    let user_id = user_id.ok_or_else(|| ApiErr::bad_request(INVALID_FORM).json())?;
    storage::query_one(
        conn,
        db::organizations::get_org_user_by_id(&org.id, user_id),
        storage::org_user_from_row,
    )
    .map_err(json_db("find organization user"))?
    .filter(|ou| ou.active)
    .ok_or_else(|| ApiErr::not_found("User not found").json())
}

/// POST /team/{team_id}/admin/api/{action}/ — `removeteammember`,
/// `addteammember`, `addteamadmin`, `removeteamadmin`, `changeteamlead`.
pub async fn admin_action(
    State(db): State<Db>,
    user: AuthUser,
    Path((team_id, action)): Path<(String, String)>,
    Form(req): Form<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiErr> {
    let mut conn = db.conn();
    let (org, team) = team_with_role(&conn, &user, &team_id, Role::Admin).map_err(ApiErr::json)?;

    match action.as_str() {
        "removeteammember" => {
            let member_id = req
                .teammember_id
                .ok_or_else(|| ApiErr::bad_request(INVALID_FORM).json())?;
            storage::execute(&conn, db::teams::set_member_active(&team.id, &member_id, false))
                .map_err(json_db("remove team member"))?;
            tracing::info!(team_id = %team.id, member_id = %member_id, "removed team member");
            Ok(Json(ActionResponse::success()))
        }
        "addteammember" => {
            let target = org_user_target(&conn, &org, req.user_id.as_deref())?;
            let existing = storage::query_one(&conn, db::teams::find_member(&team.id, &target.id), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
            })
            .map_err(json_db("find team member"))?;
            let member_id = match existing {
                Some((_, true)) => return Err(ApiErr::conflict("User already in team.").json()),
                Some((id, false)) => {
                    storage::execute(&conn, db::teams::set_member_active(&team.id, &id, true))
                        .map_err(json_db("reactivate team member"))?;
                    id
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    storage::execute(&conn, db::teams::insert_member(&id, &team.id, &target.id))
                        .map_err(json_db("insert team member"))?;
                    id
                }
            };
            tracing::info!(team_id = %team.id, member_id = %member_id, "added team member");
            Ok(Json(ActionResponse::success_with(
                serde_json::json!({ "teamMemberId": member_id }),
            )))
        }
        "addteamadmin" => {
            let target = org_user_target(&conn, &org, req.user_id.as_deref())?;
            let exists = storage::query_flag(&conn, db::teams::admin_exists(&team.id, &target.id))
                .map_err(json_db("check team admin"))?;
            if exists {
                return Err(ApiErr::conflict(
                    "Could not create team admin instance or user is already admin.",
                )
                .json());
            }
            let admin_id = Uuid::new_v4().to_string();
            storage::execute(&conn, db::teams::insert_admin(&admin_id, &team.id, &target.id))
                .map_err(json_db("insert team admin"))?;
            Ok(Json(ActionResponse::success_with(
                serde_json::json!({ "teamAdminId": admin_id }),
            )))
        }
        "removeteamadmin" => {
            let admin_id = req
                .teamadmin_id
                .ok_or_else(|| ApiErr::bad_request(INVALID_FORM).json())?;
            let admin = storage::query_one(&conn, db::teams::get_admin(&team.id, &admin_id), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(json_db("find team admin"))?
            .filter(|(_, org_user_id)| *org_user_id != org.org_user.id)
            .ok_or_else(|| ApiErr::not_found("Admin user not found or is the current user").json())?;
            storage::execute(&conn, db::teams::delete_admin(&team.id, &admin.0))
                .map_err(json_db("remove team admin"))?;
            Ok(Json(ActionResponse::success()))
        }
        "changeteamlead" => {
            let target = org_user_target(&conn, &org, req.user_id.as_deref())?;
            let tx = conn.transaction().map_err(json_db("begin transaction"))?;
            storage::execute(&tx, db::teams::set_team_lead(&team.id, &target.id))
                .map_err(json_db("set team lead"))?;
            let is_admin = storage::query_flag(&tx, db::teams::admin_exists(&team.id, &target.id))
                .map_err(json_db("check team admin"))?;
            if !is_admin {
                storage::execute(
                    &tx,
                    db::teams::insert_admin(&Uuid::new_v4().to_string(), &team.id, &target.id),
                )
                .map_err(json_db("insert team admin"))?;
            }
            tx.commit().map_err(json_db("commit team lead"))?;
            tracing::info!(team_id = %team.id, org_user_id = %target.id, "changed team lead");
            Ok(Json(ActionResponse::success()))
        }
        _ => Err(ApiErr::bad_request("Unknown action").json()),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use teambeat_api::db;

    use crate::storage;
    use crate::test_support::{TestApp, body_string, get, json_body, location, post_form};

    #[tokio::test]
    async fn dashboard_needs_a_selected_organization() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let cookie = app.login_cookie(&ada);

        let response = app.send(get("/", Some(&cookie))).await;
        assert_eq!(location(&response), "/organization/select/");
    }

    #[tokio::test]
    async fn creating_a_team_sets_up_the_creator() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let org_id = app.create_org("Acme", &ada);
        let cookie = app.login_cookie_in(&ada, &org_id);

        let response = app
            .send(post_form(
                "/team/create/",
                Some(&cookie),
                "name=Core&creator_is_member=Y&creator_is_lead=Y",
            ))
            .await;
        assert_eq!(location(&response), "/");
        let page = body_string(app.send(get("/", Some(&cookie))).await).await;
        assert!(page.contains("Team &quot;Core&quot; created"));
        assert!(page.contains("Teams I lead"));
        assert!(page.contains("Teams I administer"));

        let duplicate = app
            .send(post_form("/team/create/", Some(&cookie), "name=Core&creator_is_member=N&creator_is_lead=N"))
            .await;
        assert_eq!(duplicate.status(), StatusCode::OK);
        assert!(body_string(duplicate).await.contains("A team with this name already exists"));
    }

    #[tokio::test]
    async fn status_is_set_once_then_updated() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let org_id = app.create_org("Acme", &ada);
        let ada_ou = app.org_user_id(&org_id, &ada);
        let team_id = app.create_team(&org_id, "Core");
        app.add_team_member(&team_id, &ada_ou);
        let cookie = app.login_cookie_in(&ada, &org_id);
        let uri = format!("/team/{team_id}/status/");

        let first = app
            .send(post_form(&uri, Some(&cookie), "selected-status=yellow&status-additional-info-team=&status-additional-info-lead=tired"))
            .await;
        assert_eq!(location(&first), "/");
        let page = body_string(app.send(get("/", Some(&cookie))).await).await;
        assert!(page.contains("Thank you for setting your Core status!"));

        app.send(post_form(&uri, Some(&cookie), "selected-status=red")).await;
        let page = body_string(app.send(get("/", Some(&cookie))).await).await;
        assert!(page.contains("Your Core status for today has been updated"));

        let api = json_body(app.send(get("/api/dashboard/", Some(&cookie))).await).await;
        assert_eq!(api["teams"][0]["teamName"], "Core");
        assert_eq!(api["teams"][0]["status"], "red");

        let form = body_string(app.send(get(&uri, Some(&cookie))).await).await;
        assert!(form.contains("value=\"red\" checked"));
    }

    #[tokio::test]
    async fn invalid_status_is_rejected_inline() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let org_id = app.create_org("Acme", &ada);
        let ada_ou = app.org_user_id(&org_id, &ada);
        let team_id = app.create_team(&org_id, "Core");
        app.add_team_member(&team_id, &ada_ou);
        let cookie = app.login_cookie_in(&ada, &org_id);

        let response = app
            .send(post_form(&format!("/team/{team_id}/status/"), Some(&cookie), "selected-status=blue"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("Select a status."));
    }

    #[tokio::test]
    async fn team_pages_enforce_roles() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let bob = app.create_user("bob@example.com", "Bob", "Builder");
        let org_id = app.create_org("Acme", &ada);
        app.add_org_user(&org_id, &bob, false);
        let team_id = app.create_team(&org_id, "Core");
        let cookie = app.login_cookie_in(&bob, &org_id);

        let status = app.send(get(&format!("/team/{team_id}/status/"), Some(&cookie))).await;
        assert_eq!(status.status(), StatusCode::FORBIDDEN);
        assert!(body_string(status).await.contains("You are not a member of this team"));

        let lead = app.send(get(&format!("/team/{team_id}/lead/"), Some(&cookie))).await;
        assert_eq!(lead.status(), StatusCode::FORBIDDEN);
        assert!(body_string(lead).await.contains("You are not a Team Lead for this team"));

        let admin = app.send(get(&format!("/team/{team_id}/admin/"), Some(&cookie))).await;
        assert_eq!(admin.status(), StatusCode::FORBIDDEN);
        assert!(body_string(admin).await.contains("You are not an admin for this team"));

        let missing = app.send(get("/team/nope/admin/", Some(&cookie))).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lead_sees_lead_only_notes() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let bob = app.create_user("bob@example.com", "Bob", "Builder");
        let org_id = app.create_org("Acme", &ada);
        let ada_ou = app.org_user_id(&org_id, &ada);
        let bob_ou = app.add_org_user(&org_id, &bob, false);
        let team_id = app.create_team(&org_id, "Core");
        app.add_team_member(&team_id, &bob_ou);
        app.set_team_lead(&team_id, &ada_ou);

        let bob_cookie = app.login_cookie_in(&bob, &org_id);
        app.send(post_form(
            &format!("/team/{team_id}/status/"),
            Some(&bob_cookie),
            "selected-status=red&status-additional-info-lead=blocked+on+review",
        ))
        .await;

        let ada_cookie = app.login_cookie_in(&ada, &org_id);
        let page = app.send(get(&format!("/team/{team_id}/lead/"), Some(&ada_cookie))).await;
        assert_eq!(page.status(), StatusCode::OK);
        let body = body_string(page).await;
        assert!(body.contains("Bob Builder"));
        assert!(body.contains("blocked on review"));
        assert!(body.contains("status-red"));
    }

    #[tokio::test]
    async fn team_admin_manages_members_and_admins() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let bob = app.create_user("bob@example.com", "Bob", "Builder");
        let org_id = app.create_org("Acme", &ada);
        let ada_ou = app.org_user_id(&org_id, &ada);
        let bob_ou = app.add_org_user(&org_id, &bob, false);
        let team_id = app.create_team(&org_id, "Core");
        let ada_admin = app.add_team_admin(&team_id, &ada_ou);
        let cookie = app.login_cookie_in(&ada, &org_id);
        let api = |action: &str| format!("/team/{team_id}/admin/api/{action}/");

        let page = app.send(get(&format!("/team/{team_id}/admin/"), Some(&cookie))).await;
        assert_eq!(page.status(), StatusCode::OK);
        assert_eq!(app.session_state(&cookie).current_team_id, Some(team_id.clone()));

        let added = app
            .send(post_form(&api("addteammember"), Some(&cookie), &format!("user_id={bob_ou}")))
            .await;
        assert_eq!(added.status(), StatusCode::OK);
        let member_id = json_body(added).await["data"]["teamMemberId"]
            .as_str()
            .unwrap()
            .to_string();

        let again = app
            .send(post_form(&api("addteammember"), Some(&cookie), &format!("user_id={bob_ou}")))
            .await;
        assert_eq!(again.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(again).await["errorMessage"], "User already in team.");

        let removed = app
            .send(post_form(&api("removeteammember"), Some(&cookie), &format!("teammember_id={member_id}")))
            .await;
        assert_eq!(json_body(removed).await["status"], "success");
        {
            let conn = app.state.db.conn();
            assert!(!storage::query_flag(&conn, db::teams::is_member(&team_id, &bob.id)).unwrap());
        }

        let invalid = app.send(post_form(&api("removeteammember"), Some(&cookie), "")).await;
        assert_eq!(
            json_body(invalid).await["errorMessage"],
            "Could not complete request: invalid form"
        );

        app.send(post_form(&api("addteamadmin"), Some(&cookie), &format!("user_id={bob_ou}")))
            .await;
        let twice = app
            .send(post_form(&api("addteamadmin"), Some(&cookie), &format!("user_id={bob_ou}")))
            .await;
        assert_eq!(
            json_body(twice).await["errorMessage"],
            "Could not create team admin instance or user is already admin."
        );

        let self_removal = app
            .send(post_form(&api("removeteamadmin"), Some(&cookie), &format!("teamadmin_id={ada_admin}")))
            .await;
        assert_eq!(
            json_body(self_removal).await["errorMessage"],
            "Admin user not found or is the current user"
        );

        let unknown = app.send(post_form(&api("explode"), Some(&cookie), "")).await;
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(unknown).await["errorMessage"], "Unknown action");
    }

    #[tokio::test]
    async fn changing_the_lead_grants_admin() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let bob = app.create_user("bob@example.com", "Bob", "Builder");
        let org_id = app.create_org("Acme", &ada);
        let ada_ou = app.org_user_id(&org_id, &ada);
        let bob_ou = app.add_org_user(&org_id, &bob, false);
        let team_id = app.create_team(&org_id, "Core");
        app.add_team_admin(&team_id, &ada_ou);
        let cookie = app.login_cookie_in(&ada, &org_id);

        let response = app
            .send(post_form(
                &format!("/team/{team_id}/admin/api/changeteamlead/"),
                Some(&cookie),
                &format!("user_id={bob_ou}"),
            ))
            .await;
        assert_eq!(json_body(response).await["status"], "success");

        let conn = app.state.db.conn();
        assert!(storage::query_flag(&conn, db::teams::is_lead(&team_id, &bob.id)).unwrap());
        assert!(storage::query_flag(&conn, db::teams::is_admin(&team_id, &bob.id)).unwrap());
    }

    #[tokio::test]
    async fn user_search_reports_blank_terms_in_band() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let bob = app.create_user("bob@example.com", "Bob", "Builder");
        let org_id = app.create_org("Acme", &ada);
        app.add_org_user(&org_id, &bob, false);
        let cookie = app.login_cookie_in(&ada, &org_id);

        let blank = json_body(app.send(get("/api/users/search/?search_term=+", Some(&cookie))).await).await;
        assert_eq!(blank["status"], "error");
        assert_eq!(blank["errorMessage"], "Form error");

        let hits = json_body(app.send(get("/api/users/search/?search_term=build", Some(&cookie))).await).await;
        assert_eq!(hits["status"], "success");
        assert_eq!(hits["searchResult"].as_array().unwrap().len(), 1);
        assert_eq!(hits["searchResult"][0]["displayName"], "Bob Builder");
    }
}
