//! Role checks against explicit membership rows.

use rusqlite::Connection;

use teambeat_api::db;

use crate::error::ApiErr;
use crate::storage;

#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Organization(&'a str),
    Team(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
    /// Team scope only.
    Lead,
}

/// Whether `user_id` holds `role` within `scope`. Deactivated organization
/// users hold no roles anywhere in that organization.
pub fn check_role(
    conn: &Connection,
    user_id: &str,
    scope: Scope<'_>,
    role: Role,
) -> rusqlite::Result<bool> {
    let built = match (scope, role) {
        (Scope::Organization(org_id), Role::Member) => {
            db::organizations::has_role(org_id, user_id, false)
        }
        (Scope::Organization(org_id), Role::Admin) => {
            db::organizations::has_role(org_id, user_id, true)
        }
        (Scope::Organization(_), Role::Lead) => return Ok(false),
        (Scope::Team(team_id), Role::Member) => db::teams::is_member(team_id, user_id),
        (Scope::Team(team_id), Role::Admin) => db::teams::is_admin(team_id, user_id),
        (Scope::Team(team_id), Role::Lead) => db::teams::is_lead(team_id, user_id),
    };
    storage::query_flag(conn, built)
}

/// Fixed 403 message for a failed check.
pub fn denied_message(scope: Scope<'_>, role: Role) -> &'static str {
    match (scope, role) {
        (Scope::Organization(_), Role::Admin) => {
            "Access denied for this page. You are not an admin for this organization"
        }
        (Scope::Organization(_), _) => {
            "Access denied for this page. You are not a member of this organization"
        }
        (Scope::Team(_), Role::Admin) => {
            "Access denied for this page. You are not an admin for this team"
        }
        (Scope::Team(_), Role::Lead) => {
            "Access denied for this page. You are not a Team Lead for this team"
        }
        (Scope::Team(_), Role::Member) => {
            "Access denied for this page. You are not a member of this team"
        }
    }
}

/// [`check_role`] that fails with the matching 403.
pub fn require_role(
    conn: &Connection,
    user_id: &str,
    scope: Scope<'_>,
    role: Role,
) -> Result<(), ApiErr> {
    if check_role(conn, user_id, scope, role).map_err(ApiErr::from_db("check role"))? {
        Ok(())
    } else {
        tracing::info!(user_id, ?scope, ?role, "role check failed");
        Err(ApiErr::forbidden(denied_message(scope, role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{execute, init_db};

    #[test]
    fn roles_follow_membership_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(&dir.path().join("test.db")).unwrap();
        let conn = db.conn();

        execute(&conn, db::users::insert("u1", "a@x.io", "a@x.io", "A", "A", None)).unwrap();
        execute(&conn, db::users::insert("u2", "b@x.io", "b@x.io", "B", "B", None)).unwrap();
        execute(&conn, db::organizations::insert("o1", "Acme")).unwrap();
        execute(&conn, db::organizations::insert_org_user("ou1", "o1", "u1", true)).unwrap();
        execute(&conn, db::organizations::insert_org_user("ou2", "o1", "u2", false)).unwrap();
        execute(&conn, db::teams::insert("t1", "Core", "o1", Some("ou2"))).unwrap();
        execute(&conn, db::teams::insert_admin("ta1", "t1", "ou1")).unwrap();
        execute(&conn, db::teams::insert_member("tm1", "t1", "ou2")).unwrap();

        let org = Scope::Organization("o1");
        let team = Scope::Team("t1");
        assert!(check_role(&conn, "u1", org, Role::Admin).unwrap());
        assert!(!check_role(&conn, "u2", org, Role::Admin).unwrap());
        assert!(check_role(&conn, "u2", org, Role::Member).unwrap());
        assert!(!check_role(&conn, "u1", org, Role::Lead).unwrap());

        assert!(check_role(&conn, "u1", team, Role::Admin).unwrap());
        assert!(!check_role(&conn, "u1", team, Role::Member).unwrap());
        assert!(check_role(&conn, "u2", team, Role::Member).unwrap());
        assert!(check_role(&conn, "u2", team, Role::Lead).unwrap());

        // Deactivating the organization user revokes every role.
        execute(&conn, db::organizations::set_active("ou2", false)).unwrap();
        assert!(!check_role(&conn, "u2", org, Role::Member).unwrap());
        assert!(!check_role(&conn, "u2", team, Role::Lead).unwrap());
    }

    #[test]
    fn denied_messages_are_fixed_per_role() {
        assert_eq!(
            denied_message(Scope::Team("t"), Role::Lead),
            "Access denied for this page. You are not a Team Lead for this team"
        );
        assert_eq!(
            denied_message(Scope::Organization("o"), Role::Admin),
            "Access denied for this page. You are not an admin for this organization"
        );
    }
}
