//! User query builders.

use sea_query::{Asterisk, Expr, Func, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Users;

// ── User columns helper ───────────────────────────────────────────────────

/// Column order: id, email, username, first_name, last_name, password_hash, password_salt.
fn user_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.columns([
        Users::Id,
        Users::Email,
        Users::Username,
        Users::FirstName,
        Users::LastName,
        Users::PasswordHash,
        Users::PasswordSalt,
    ])
}

// ── User lookups ───────────────────────────────────────────────────────────

/// Find user by id.
pub fn get_by_id(user_id: &str) -> Built {
    let mut q = Query::select().to_owned();
    user_columns(&mut q);
    q.from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Find user by email. The column is `COLLATE NOCASE`.
pub fn get_by_email(email: &str) -> Built {
    let mut q = Query::select().to_owned();
    user_columns(&mut q);
    q.from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .build(SqliteQueryBuilder)
}

/// Find user by username, case-insensitively.
pub fn get_by_username(username: &str) -> Built {
    let mut q = Query::select().to_owned();
    user_columns(&mut q);
    q.from(Users::Table)
        .and_where(Expr::col(Users::Username).eq(username))
        .build(SqliteQueryBuilder)
}

/// Whether any user other than `exclude_user_id` already owns `email`.
pub fn email_taken(email: &str, exclude_user_id: Option<&str>) -> Built {
    let mut q = Query::select()
        .expr(Expr::expr(Func::count(Expr::col(Asterisk))).gt(0))
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .to_owned();
    if let Some(user_id) = exclude_user_id {
        q.and_where(Expr::col(Users::Id).ne(user_id));
    }
    q.build(SqliteQueryBuilder)
}

// ── User inserts ───────────────────────────────────────────────────────────

/// Insert a user. Invited users have no password until they set one.
pub fn insert(
    id: &str,
    email: &str,
    username: &str,
    first_name: &str,
    last_name: &str,
    password: Option<(&str, &str)>,
) -> Built {
    let (hash, salt) = match password {
        Some((hash, salt)) => (Some(hash.to_string()), Some(salt.to_string())),
        None => (None, None),
    };
    Query::insert()
        .into_table(Users::Table)
        .columns([
            Users::Id,
            Users::Email,
            Users::Username,
            Users::FirstName,
            Users::LastName,
            Users::PasswordHash,
            Users::PasswordSalt,
        ])
        .values_panic([
            id.into(),
            email.into(),
            username.into(),
            first_name.into(),
            last_name.into(),
            hash.into(),
            salt.into(),
        ])
        .build(SqliteQueryBuilder)
}

// ── User updates ───────────────────────────────────────────────────────────

/// Update profile fields. The username follows the email.
pub fn update_profile(user_id: &str, email: &str, first_name: &str, last_name: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::Email, email)
        .value(Users::Username, email)
        .value(Users::FirstName, first_name)
        .value(Users::LastName, last_name)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Update password.
pub fn update_password(user_id: &str, password_hash: &str, password_salt: &str) -> Built {
    Query::update()
        .table(Users::Table)
        .value(Users::PasswordHash, password_hash)
        .value(Users::PasswordSalt, password_salt)
        .and_where(Expr::col(Users::Id).eq(user_id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_taken_excludes_self() {
        let (sql, _) = email_taken("a@b.co", Some("u1"));
        assert!(sql.contains(r#""email" = ?"#));
        assert!(sql.contains(r#""id" <> ?"#));

        let (sql, _) = email_taken("a@b.co", None);
        assert!(!sql.contains(r#""id""#));
    }
}
