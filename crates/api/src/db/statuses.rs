//! Daily team member status query builders.

use sea_query::{Cond, Expr, OnConflict, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::{OrganizationUsers, TeamMemberStatuses, TeamMembers, Users};

/// Insert or update a member's status for one day.
#[allow(clippy::too_many_arguments)]
pub fn upsert(
    id: &str,
    team_member_id: &str,
    day: &str,
    status: &str,
    info_for_team: Option<&str>,
    info_for_lead: Option<&str>,
    updated_at: &str,
) -> Built {
    Query::insert()
        .into_table(TeamMemberStatuses::Table)
        .columns([
            TeamMemberStatuses::Id,
            TeamMemberStatuses::TeamMemberId,
            TeamMemberStatuses::Day,
            TeamMemberStatuses::Status,
            TeamMemberStatuses::InfoForTeam,
            TeamMemberStatuses::InfoForLead,
            TeamMemberStatuses::UpdatedAt,
        ])
        .values_panic([
            id.into(),
            team_member_id.into(),
            day.into(),
            status.into(),
            info_for_team.map(|s| s.to_string()).into(),
            info_for_lead.map(|s| s.to_string()).into(),
            updated_at.into(),
        ])
        .on_conflict(
            OnConflict::columns([TeamMemberStatuses::TeamMemberId, TeamMemberStatuses::Day])
                .update_columns([
                    TeamMemberStatuses::Status,
                    TeamMemberStatuses::InfoForTeam,
                    TeamMemberStatuses::InfoForLead,
                    TeamMemberStatuses::UpdatedAt,
                ])
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// A member's status for one day.
/// Returns: status, info_for_team, info_for_lead.
pub fn get_for_member(team_member_id: &str, day: &str) -> Built {
    Query::select()
        .columns([
            TeamMemberStatuses::Status,
            TeamMemberStatuses::InfoForTeam,
            TeamMemberStatuses::InfoForLead,
        ])
        .from(TeamMemberStatuses::Table)
        .and_where(Expr::col(TeamMemberStatuses::TeamMemberId).eq(team_member_id))
        .and_where(Expr::col(TeamMemberStatuses::Day).eq(day))
        .build(SqliteQueryBuilder)
}

/// Every active member of a team with their status for `day`, if any.
/// Returns: member id, email, first_name, last_name, status?, info_for_team?, info_for_lead?.
pub fn list_for_team(team_id: &str, day: &str) -> Built {
    Query::select()
        .column((TeamMembers::Table, TeamMembers::Id))
        .column((Users::Table, Users::Email))
        .column((Users::Table, Users::FirstName))
        .column((Users::Table, Users::LastName))
        .column((TeamMemberStatuses::Table, TeamMemberStatuses::Status))
        .column((TeamMemberStatuses::Table, TeamMemberStatuses::InfoForTeam))
        .column((TeamMemberStatuses::Table, TeamMemberStatuses::InfoForLead))
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
        .left_join(
            TeamMemberStatuses::Table,
            Cond::all()
                .add(
                    Expr::col((TeamMemberStatuses::Table, TeamMemberStatuses::TeamMemberId))
                        .equals((TeamMembers::Table, TeamMembers::Id)),
                )
                .add(Expr::col((TeamMemberStatuses::Table, TeamMemberStatuses::Day)).eq(day)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::Active)).eq(true))
        .and_where(Expr::col((OrganizationUsers::Table, OrganizationUsers::Active)).eq(true))
        .order_by((Users::Table, Users::LastName), Order::Asc)
        .order_by((Users::Table, Users::FirstName), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Reported statuses of a team's active members for `day`. Returns: status.
pub fn team_statuses(team_id: &str, day: &str) -> Built {
    Query::select()
        .column((TeamMemberStatuses::Table, TeamMemberStatuses::Status))
        .from(TeamMemberStatuses::Table)
        .inner_join(
            TeamMembers::Table,
            Expr::col((TeamMembers::Table, TeamMembers::Id))
                .equals((TeamMemberStatuses::Table, TeamMemberStatuses::TeamMemberId)),
        )
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::TeamId)).eq(team_id))
        .and_where(Expr::col((TeamMembers::Table, TeamMembers::Active)).eq(true))
        .and_where(Expr::col((TeamMemberStatuses::Table, TeamMemberStatuses::Day)).eq(day))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_is_keyed_by_member_and_day() {
        let (sql, _) = upsert("s1", "m1", "2024-01-01", "red", None, None, "now");
        assert!(sql.contains(r#"ON CONFLICT ("team_member_id", "day") DO UPDATE"#));
    }

    #[test]
    fn test_list_for_team_filters_status_join_by_day() {
        let (sql, values) = list_for_team("team", "2024-01-01");
        assert!(sql.contains("LEFT JOIN \"team_member_statuses\""));
        let rendered: Vec<String> = values.0.iter().map(|v| format!("{v:?}")).collect();
        assert!(rendered.iter().any(|v| v.contains("2024-01-01")));
    }
}
