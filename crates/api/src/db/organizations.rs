//! Organization + organization-user query builders.

use sea_query::{Asterisk, Cond, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{OrganizationUsers, Organizations, Users};
use crate::service::SearchTerm;

// ── Organizations ─────────────────────────────────────────────────────────

/// INSERT a new organization.
pub fn insert(id: &str, name: &str) -> Built {
    Query::insert()
        .into_table(Organizations::Table)
        .columns([Organizations::Id, Organizations::Name])
        .values_panic([id.into(), name.into()])
        .build(SqliteQueryBuilder)
}

/// SELECT id, name by id.
pub fn get_by_id(id: &str) -> Built {
    Query::select()
        .columns([Organizations::Id, Organizations::Name])
        .from(Organizations::Table)
        .and_where(Expr::col(Organizations::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Whether an organization with this name exists.
pub fn name_exists(name: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Organizations::Table)
        .and_where(Expr::col(Organizations::Name).eq(name))
        .build(SqliteQueryBuilder)
}

/// Organizations a user actively belongs to.
/// Returns: organization id, name, is_organization_admin.
pub fn list_for_user(user_id: &str) -> Built {
    Query::select()
        .column((Organizations::Table, Organizations::Id))
        .column((Organizations::Table, Organizations::Name))
        .column((OrganizationUsers::Table, OrganizationUsers::IsOrganizationAdmin))
        .from(Organizations::Table)
        .inner_join(
            OrganizationUsers::Table,
            Expr::col((OrganizationUsers::Table, OrganizationUsers::OrganizationId))
                .equals((Organizations::Table, Organizations::Id)),
        )
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::UserId)).eq(user_id))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .order_by((Organizations::Table, Organizations::Name), Order::Asc)
        .build(SqliteQueryBuilder)
}

// ── Organization users ────────────────────────────────────────────────────

/// Column order: id, organization_id, user_id, is_organization_admin, active.
fn org_user_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column((OrganizationUsers::Table, OrganizationUsers::Id))
        .column((OrganizationUsers::Table, OrganizationUsers::OrganizationId))
        .column((OrganizationUsers::Table, OrganizationUsers::UserId))
        .column((OrganizationUsers::Table, OrganizationUsers::IsOrganizationAdmin))
        .column((OrganizationUsers::Table, OrganizationUsers::Active))
}

/// INSERT an organization user.
pub fn insert_org_user(id: &str, organization_id: &str, user_id: &str, is_admin: bool) -> Built {
    Query::insert()
        .into_table(OrganizationUsers::Table)
        .columns([
            OrganizationUsers::Id,
            OrganizationUsers::OrganizationId,
            OrganizationUsers::UserId,
            OrganizationUsers::IsOrganizationAdmin,
            OrganizationUsers::Active,
        ])
        .values_panic([
            id.into(),
            organization_id.into(),
            user_id.into(),
            is_admin.into(),
            true.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Look up the membership row for (organization, user), active or not.
pub fn get_org_user(organization_id: &str, user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    org_user_columns(&mut q);
    q.from(OrganizationUsers::Table)
        .and_where(Expr::col(OrganizationUsers::OrganizationId).eq(organization_id))
        .and_where(Expr::col(OrganizationUsers::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Look up a membership row by its id, scoped to one organization.
pub fn get_org_user_by_id(organization_id: &str, org_user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    org_user_columns(&mut q);
    q.from(OrganizationUsers::Table)
        .and_where(Expr::col(OrganizationUsers::Id).eq(org_user_id))
        .and_where(Expr::col(OrganizationUsers::OrganizationId).eq(organization_id))
        .build(SqliteQueryBuilder)
}

/// Set the `active` flag.
pub fn set_active(org_user_id: &str, active: bool) -> Built {
    Query::update()
        .table(OrganizationUsers::Table)
        .value(OrganizationUsers::Active, active)
        .and_where(Expr::col(OrganizationUsers::Id).eq(org_user_id))
        .build(SqliteQueryBuilder)
}

/// Set the admin flag.
pub fn set_admin(org_user_id: &str, is_admin: bool) -> Built {
    Query::update()
        .table(OrganizationUsers::Table)
        .value(OrganizationUsers::IsOrganizationAdmin, is_admin)
        .and_where(Expr::col(OrganizationUsers::Id).eq(org_user_id))
        .build(SqliteQueryBuilder)
}

/// Whether a user is an active member (optionally an admin) of an organization.
pub fn has_role(organization_id: &str, user_id: &str, require_admin: bool) -> Built {
    let mut q = Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(OrganizationUsers::Table)
        .and_where(Expr::col(OrganizationUsers::OrganizationId).eq(organization_id))
        .and_where(Expr::col(OrganizationUsers::UserId).eq(user_id))
        .and_where(Expr::col(OrganizationUsers::Active).eq(true))
        .to_owned();
    if require_admin {
        q.and_where(Expr::col(OrganizationUsers::IsOrganizationAdmin).eq(true));
    }
    q.build(SqliteQueryBuilder)
}

/// Column order: org user id, user id, email, first_name, last_name, is_organization_admin.
fn member_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column((OrganizationUsers::Table, OrganizationUsers::Id))
        .column((Users::Table, Users::Id))
        .column((Users::Table, Users::Email))
        .column((Users::Table, Users::FirstName))
        .column((Users::Table, Users::LastName))
        .column((OrganizationUsers::Table, OrganizationUsers::IsOrganizationAdmin))
}

/// Active users of an organization.
pub fn list_active_users(organization_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    member_columns(&mut q);
    q.from(OrganizationUsers::Table)
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((OrganizationUsers::Table, OrganizationUsers::UserId)),
        )
        .and_where(
            Expr::col((OrganizationUsers::Table, OrganizationUsers::OrganizationId))
                .eq(organization_id),
        )
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .order_by((Users::Table, Users::LastName), Order::Asc)
        .order_by((Users::Table, Users::FirstName), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Active users of an organization matching a search term (case-insensitive LIKE).
pub fn search(organization_id: &str, term: &SearchTerm, limit: u64) -> Built {
    let contains = |s: &str| format!("%{s}%");
    let cond = match term {
        SearchTerm::Email(email) => {
            Cond::all().add(Expr::col((Users::Table, Users::Email)).like(contains(email)))
        }
        SearchTerm::FullName { first, last } => Cond::any()
            .add(Expr::col((Users::Table, Users::FirstName)).like(contains(first)))
            .add(Expr::col((Users::Table, Users::LastName)).like(contains(last))),
        SearchTerm::Name(name) => Cond::any()
            .add(Expr::col((Users::Table, Users::FirstName)).like(contains(name)))
            .add(Expr::col((Users::Table, Users::LastName)).like(contains(name))),
    };

    let mut q = Query::select().to_owned();
    member_columns(&mut q);
    q.from(OrganizationUsers::Table)
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((OrganizationUsers::Table, OrganizationUsers::UserId)),
        )
        .and_where(
            Expr::col((OrganizationUsers::Table, OrganizationUsers::OrganizationId))
                .eq(organization_id),
        )
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .cond_where(cond)
        .order_by((Users::Table, Users::LastName), Order::Asc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}
