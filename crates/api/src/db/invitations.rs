//! Organization invitation query builders.

use sea_query::{Asterisk, Expr, Func, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{OrganizationInvitations, Organizations, Users};

/// INSERT a new invitation.
pub fn insert(id: &str, organization_id: &str, user_id: &str, invited_by: &str) -> Built {
    Query::insert()
        .into_table(OrganizationInvitations::Table)
        .columns([
            OrganizationInvitations::Id,
            OrganizationInvitations::OrganizationId,
            OrganizationInvitations::UserId,
            OrganizationInvitations::InvitedBy,
        ])
        .values_panic([
            id.into(),
            organization_id.into(),
            user_id.into(),
            invited_by.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Whether a user already has a pending invitation to an organization.
pub fn exists(organization_id: &str, user_id: &str) -> Built {
    Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(OrganizationInvitations::Table)
        .and_where(Expr::col(OrganizationInvitations::OrganizationId).eq(organization_id))
        .and_where(Expr::col(OrganizationInvitations::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Find the invitation for (organization, user). Returns: id.
pub fn find(organization_id: &str, user_id: &str) -> Built {
    Query::select()
        .column(OrganizationInvitations::Id)
        .from(OrganizationInvitations::Table)
        .and_where(Expr::col(OrganizationInvitations::OrganizationId).eq(organization_id))
        .and_where(Expr::col(OrganizationInvitations::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// DELETE an invitation by id, scoped to one organization.
pub fn delete(organization_id: &str, id: &str) -> Built {
    Query::delete()
        .from_table(OrganizationInvitations::Table)
        .and_where(Expr::col(OrganizationInvitations::Id).eq(id))
        .and_where(Expr::col(OrganizationInvitations::OrganizationId).eq(organization_id))
        .build(SqliteQueryBuilder)
}

/// Pending invitations for an organization.
/// Returns: invitation id, email, first_name, last_name, created_at.
pub fn list_for_organization(organization_id: &str) -> Built {
    Query::select()
        .column((OrganizationInvitations::Table, OrganizationInvitations::Id))
        .column((Users::Table, Users::Email))
        .column((Users::Table, Users::FirstName))
        .column((Users::Table, Users::LastName))
        .column((OrganizationInvitations::Table, OrganizationInvitations::CreatedAt))
        .from(OrganizationInvitations::Table)
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id))
                .equals((OrganizationInvitations::Table, OrganizationInvitations::UserId)),
        )
        .and_where(
            Expr::col((
                OrganizationInvitations::Table,
                OrganizationInvitations::OrganizationId,
            ))
            .eq(organization_id),
        )
        .order_by(
            (OrganizationInvitations::Table, OrganizationInvitations::CreatedAt),
            Order::Desc,
        )
        .build(SqliteQueryBuilder)
}

/// Pending invitations addressed to a user.
/// Returns: invitation id, organization id, organization name.
pub fn list_for_user(user_id: &str) -> Built {
    Query::select()
        .column((OrganizationInvitations::Table, OrganizationInvitations::Id))
        .column((Organizations::Table, Organizations::Id))
        .column((Organizations::Table, Organizations::Name))
        .from(OrganizationInvitations::Table)
        .inner_join(
            Organizations::Table,
            Expr::col((Organizations::Table, Organizations::Id)).equals((
                OrganizationInvitations::Table,
                OrganizationInvitations::OrganizationId,
            )),
        )
        .and_where(
            Expr::col((OrganizationInvitations::Table, OrganizationInvitations::UserId))
                .eq(user_id),
        )
        .order_by((Organizations::Table, Organizations::Name), Order::Asc)
        .build(SqliteQueryBuilder)
}
