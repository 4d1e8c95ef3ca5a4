//! Team, team member, and team admin query builders.

use sea_query::{Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{OrganizationUsers, TeamAdmins, TeamMembers, Teams, Users};

// ── Teams ─────────────────────────────────────────────────────────────────

/// INSERT a new team.
pub fn insert(id: &str, name: &str, organization_id: &str, team_lead_id: Option<&str>) -> Built {
    Query::insert()
        .into_table(Teams::Table)
        .columns([Teams::Id, Teams::Name, Teams::OrganizationId, Teams::TeamLeadId])
        .values_panic([
            id.into(),
            name.into(),
            organization_id.into(),
            team_lead_id.map(|s| s.to_string()).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// SELECT a team by id. Returns: id, name, organization_id, team_lead_id.
pub fn get_by_id(id: &str) -> Built {
    Query::select()
        .columns([Teams::Id, Teams::Name, Teams::OrganizationId, Teams::TeamLeadId])
        .from(Teams::Table)
        .and_where(Expr::col(Teams::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Whether an organization already has a team with this name.
pub fn name_exists(organization_id: &str, name: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Teams::Table)
        .and_where(Expr::col(Teams::OrganizationId).eq(organization_id))
        .and_where(Expr::col(Teams::Name).eq(name))
        .build(SqliteQueryBuilder)
}

/// Point a team at a new lead.
pub fn set_team_lead(team_id: &str, org_user_id: &str) -> Built {
    Query::update()
        .table(Teams::Table)
        .value(Teams::TeamLeadId, org_user_id)
        .and_where(Expr::col(Teams::Id).eq(team_id))
        .build(SqliteQueryBuilder)
}

/// Column order: team id, team name.
fn team_summary(q: &mut sea_query::SelectStatement, organization_id: &str) {
    q.column((Teams::Table, Teams::Id))
        .column((Teams::Table, Teams::Name))
        .from(Teams::Table)
        .and_where(Expr::col((Teams::Table, Teams::OrganizationId)).eq(organization_id))
        .order_by((Teams::Table, Teams::Name), Order::Asc);
}

/// Teams in an organization where the user is an active member.
pub fn list_member_teams(organization_id: &str, user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    team_summary(&mut q, organization_id);
    q.inner_join(
        TeamMembers::Table,
        Expr::col((TeamMembers::Table, TeamMembers::TeamId)).equals((Teams::Table, Teams::Id)),
    )
    .inner_join(
        OrganizationUsers::Table,
        Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
            .equals((TeamMembers::Table, TeamMembers::OrganizationUserId)),
    )
    .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
    .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
    .and_where(Expr::col((TeamMembers::Table, TeamMembers::Active)).eq(true))
    .build(SqliteQueryBuilder)
}

/// Teams in an organization the user administers.
pub fn list_admin_teams(organization_id: &str, user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    team_summary(&mut q, organization_id);
    q.inner_join(
        TeamAdmins::Table,
        Expr::col((TeamAdmins::Table, TeamAdmins::TeamId)).equals((Teams::Table, Teams::Id)),
    )
    .inner_join(
        OrganizationUsers::Table,
        Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
            .equals((TeamAdmins::Table, TeamAdmins::OrganizationUserId)),
    )
    .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
    .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
    .build(SqliteQueryBuilder)
}

/// Teams in an organization the user leads.
pub fn list_lead_teams(organization_id: &str, user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    team_summary(&mut q, organization_id);
    q.inner_join(
        OrganizationUsers::Table,
        Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
            .equals((Teams::Table, Teams::TeamLeadId)),
    )
    .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
    .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
    .build(SqliteQueryBuilder)
}

// ── Role lookups ──────────────────────────────────────────────────────────

/// Whether the user is an active member of the team.
pub fn is_member(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(TeamMembers::Table)
        .inner_join(
            OrganizationUsers::Table,
            Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
                .equals((TeamMembers::Table, TeamMembers::OrganizationUserId)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::Active)).eq(true))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .build(SqliteQueryBuilder)
}

/// Whether the user is an admin of the team.
pub fn is_admin(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(TeamAdmins::Table)
        .inner_join(
            OrganizationUsers::Table,
            Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
                .equals((TeamAdmins::Table, TeamAdmins::OrganizationUserId)),
        )
        .and_where(Expr::col((TeamAdmins::Table, TeamAdmins::TeamId)).eq(team_id))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .build(SqliteQueryBuilder)
}

/// Whether the user is the team's lead.
pub fn is_lead(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Teams::Table)
        .inner_join(
            OrganizationUsers::Table,
            Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
                .equals((Teams::Table, Teams::TeamLeadId)),
        )
        .and_where(Expr::col((Teams::Table, Teams::Id)).eq(team_id))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .build(SqliteQueryBuilder)
}

// ── Team members ──────────────────────────────────────────────────────────

/// INSERT a team member.
pub fn insert_member(id: &str, team_id: &str, org_user_id: &str) -> Built {
    Query::insert()
        .into_table(TeamMembers::Table)
        .columns([
            TeamMembers::Id,
            TeamMembers::TeamId,
            TeamMembers::OrganizationUserId,
            TeamMembers::Active,
        ])
        .values_panic([id.into(), team_id.into(), org_user_id.into(), true.into()])
        .build(SqliteQueryBuilder)
}

/// Find the member row for (team, org user). Returns: id, active.
pub fn find_member(team_id: &str, org_user_id: &str) -> Built {
    Query::select()
        .columns([TeamMembers::Id, TeamMembers::Active])
        .from(TeamMembers::Table)
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .and_where(Expr::col(TeamMembers::OrganizationUserId).eq(org_user_id))
        .build(SqliteQueryBuilder)
}

/// The current user's active member row in a team. Returns: id.
pub fn find_member_for_user(team_id: &str, user_id: &str) -> Built {
    Query::select()
        .column((TeamMembers::Table, TeamMembers::Id))
        .from(TeamMembers::Table)
        .inner_join(
            OrganizationUsers::Table,
            Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
                .equals((TeamMembers::Table, TeamMembers::OrganizationUserId)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::Active)).eq(true))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .build(SqliteQueryBuilder)
}

/// Set a member row's `active` flag, scoped to its team.
pub fn set_member_active(team_id: &str, member_id: &str, active: bool) -> Built {
    Query::update()
        .table(TeamMembers::Table)
        .value(TeamMembers::Active, active)
        .and_where(Expr::col(TeamMembers::Id).eq(member_id))
        .and_where(Expr::col(TeamMembers::TeamId).eq(team_id))
        .build(SqliteQueryBuilder)
}

/// Deactivate every team membership of an organization user.
pub fn deactivate_memberships(org_user_id: &str) -> Built {
    Query::update()
        .table(TeamMembers::Table)
        .value(TeamMembers::Active, false)
        .and_where(Expr::col(TeamMembers::OrganizationUserId).eq(org_user_id))
        .build(SqliteQueryBuilder)
}

/// Active members of a team.
/// Returns: member id, org user id, email, first_name, last_name.
pub fn list_members(team_id: &str) -> Built {
    Query::select()
        .column((TeamMembers::Table, TeamMembers::Id))
        .column((TeamMembers::Table, TeamMembers::OrganizationUserId))
        .column((Users::Table, Users::Email))
        .column((Users::Table, Users::FirstName))
        .column((Users::Table, Users::LastName))
        .from(TeamMembers::Table)
        .inner_join(
            OrganizationUsers::Table,
            Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
                .equals((TeamMembers::Table, TeamMembers::OrganizationUserId)),
        )
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((OrganizationUsers::Table, OrganizationUsers::UserId)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::Active)).eq(true))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .order_by((Users::Table, Users::LastName), Order::Asc)
        .order_by((Users::Table, Users::FirstName), Order::Asc)
        .build(SqliteQueryBuilder)
}

// ── Team admins ───────────────────────────────────────────────────────────

/// INSERT a team admin.
pub fn insert_admin(id: &str, team_id: &str, org_user_id: &str) -> Built {
    Query::insert()
        .into_table(TeamAdmins::Table)
        .columns([TeamAdmins::Id, TeamAdmins::TeamId, TeamAdmins::OrganizationUserId])
        .values_panic([id.into(), team_id.into(), org_user_id.into()])
        .build(SqliteQueryBuilder)
}

/// Whether (team, org user) is already an admin.
pub fn admin_exists(team_id: &str, org_user_id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(TeamAdmins::Table)
        .and_where(Expr::col(TeamAdmins::TeamId).eq(team_id))
        .and_where(Expr::col(TeamAdmins::OrganizationUserId).eq(org_user_id))
        .build(SqliteQueryBuilder)
}

/// Look up an admin row. Returns: id, organization_user_id.
pub fn get_admin(team_id: &str, admin_id: &str) -> Built {
    Query::select()
        .columns([TeamAdmins::Id, TeamAdmins::OrganizationUserId])
        .from(TeamAdmins::Table)
        .and_where(Expr::col(TeamAdmins::Id).eq(admin_id))
        .and_where(Expr::col(TeamAdmins::TeamId).eq(team_id))
        .build(SqliteQueryBuilder)
}

/// DELETE an admin row.
pub fn delete_admin(team_id: &str, admin_id: &str) -> Built {
    Query::delete()
        .from_table(TeamAdmins::Table)
        .and_where(Expr::col(TeamAdmins::Id).eq(admin_id))
        .and_where(Expr::col(TeamAdmins::TeamId).eq(team_id))
        .build(SqliteQueryBuilder)
}

/// Admins of a team.
/// Returns: admin id, org user id, email, first_name, last_name.
pub fn list_admins(team_id: &str) -> Built {
    Query::select()
        .column((TeamAdmins::Table, TeamAdmins::Id))
        .column((TeamAdmins::Table, TeamAdmins::OrganizationUserId))
        .column((Users::Table, Users::Email))
        .column((Users::Table, Users::FirstName))
        .column((Users::Table, Users::LastName))
        .from(TeamAdmins::Table)
        .inner_join(
            OrganizationUsers::Table,
            Expr::col((OrganizationUsers::Table, OrganizationUsers::Id))
                .equals((TeamAdmins::Table, TeamAdmins::OrganizationUserId)),
        )
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((OrganizationUsers::Table, OrganizationUsers::UserId)),
        )
        .and_where(Expr::col((TeamAdmins::Table, TeamAdmins::TeamId)).eq(team_id))
        .order_by((Users::Table, Users::LastName), Order::Asc)
        .build(SqliteQueryBuilder)
}
