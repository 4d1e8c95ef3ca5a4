//! Single-use login / password-reset tokens.
//!
//! Only the SHA-256 of a token is stored. Each user holds at most one token
//! per purpose; issuing again replaces the previous one.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use teambeat_api::service::{self, TokenError};
use teambeat_api::{ServiceError, TokenPurpose, crypto, db};

use crate::storage::{self, UserRow};

#[derive(Debug)]
pub struct IssuedToken {
    /// Raw value for the emailed link. Never stored.
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("token lookup failed: {0}")]
    Db(#[from] rusqlite::Error),
}

pub fn issue(
    conn: &Connection,
    user_id: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> Result<IssuedToken, ServiceError> {
    let value = crypto::generate_token()?;
    let expires_at = service::token_expiry(now);
    storage::execute(
        conn,
        db::tokens::upsert(
            &Uuid::new_v4().to_string(),
            user_id,
            &crypto::hash_token(&value),
            purpose.as_str(),
            &service::to_sqlite_datetime(expires_at),
        ),
    )
    .map_err(ServiceError::from_db("issue token"))?;

    tracing::info!(user_id, purpose = %purpose, "issued token");
    Ok(IssuedToken { value, expires_at })
}

/// Check a token without consuming it.
pub fn peek(
    conn: &Connection,
    token: &str,
    username: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> Result<UserRow, RedeemError> {
    lookup(conn, token, username, purpose, now).map(|(user, _)| user)
}

/// Check and consume a token. Exactly one caller can win: the row is deleted
/// by id and a caller that deletes nothing sees `Token not found.`.
pub fn redeem(
    conn: &Connection,
    token: &str,
    username: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> Result<UserRow, RedeemError> {
    let (user, token_id) = lookup(conn, token, username, purpose, now)?;
    let deleted = storage::execute(conn, db::tokens::delete_by_id(&token_id))?;
    if deleted == 0 {
        return Err(TokenError::TokenNotFound.into());
    }
    tracing::info!(user_id = %user.id, purpose = %purpose, "redeemed token");
    Ok(user)
}

fn lookup(
    conn: &Connection,
    token: &str,
    username: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> Result<(UserRow, String), RedeemError> {
    let user = storage::query_one(conn, db::users::get_by_username(username), storage::user_from_row)?
        .ok_or(TokenError::UserNotFound)?;

    let (token_id, expires_raw) = storage::query_one(
        conn,
        db::tokens::find(&user.id, purpose.as_str(), &crypto::hash_token(token)),
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?
    .ok_or(TokenError::TokenNotFound)?;

    let expiry_check = match service::parse_sqlite_datetime(&expires_raw) {
        Some(expires_at) => service::check_expiry(expires_at, now),
        None => Err(TokenError::Expired),
    };
    if let Err(e) = expiry_check {
        storage::execute(conn, db::tokens::delete_by_id(&token_id))?;
        return Err(e.into());
    }

    Ok((user, token_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::storage::{Db, init_db};

    fn setup() -> (Db, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(&dir.path().join("test.db")).unwrap();
        storage::execute(
            &db.conn(),
            db::users::insert("u1", "ada@example.com", "ada@example.com", "Ada", "L", None),
        )
        .unwrap();
        (db, dir)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn token_count(conn: &Connection, purpose: TokenPurpose) -> i64 {
        storage::query_one(conn, db::tokens::count_for_user("u1", purpose.as_str()), |row| {
            row.get(0)
        })
        .unwrap()
        .unwrap()
    }

    fn token_error(result: Result<UserRow, RedeemError>) -> TokenError {
        match result {
            Err(RedeemError::Token(e)) => e,
            Err(RedeemError::Db(e)) => panic!("unexpected db error: {e}"),
            Ok(user) => panic!("unexpected success for {}", user.id),
        }
    }

    #[test]
    fn fresh_reset_token_redeems_exactly_once() {
        let (db, _dir) = setup();
        let conn = db.conn();

        let issued = issue(&conn, "u1", TokenPurpose::Reset, now()).unwrap();
        assert_eq!(issued.value.len(), 64);
        assert_eq!(issued.expires_at, now() + Duration::hours(24));
        assert_eq!(token_count(&conn, TokenPurpose::Reset), 1);

        let later = now() + Duration::hours(23);
        let user = redeem(&conn, &issued.value, "ada@example.com", TokenPurpose::Reset, later)
            .unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(token_count(&conn, TokenPurpose::Reset), 0);

        let again = redeem(&conn, &issued.value, "ada@example.com", TokenPurpose::Reset, later);
        assert_eq!(token_error(again), TokenError::TokenNotFound);
    }

    #[test]
    fn expired_token_fails_and_is_removed() {
        let (db, _dir) = setup();
        let conn = db.conn();
        let issued = issue(&conn, "u1", TokenPurpose::Login, now()).unwrap();

        let too_late = now() + Duration::hours(24) + Duration::seconds(1);
        let result = redeem(&conn, &issued.value, "ada@example.com", TokenPurpose::Login, too_late);
        assert_eq!(token_error(result), TokenError::Expired);
        assert_eq!(token_count(&conn, TokenPurpose::Login), 0);
    }

    #[test]
    fn unknown_username_is_reported_before_token_lookup() {
        let (db, _dir) = setup();
        let conn = db.conn();
        let result = redeem(&conn, "whatever", "nobody", TokenPurpose::Login, now());
        assert_eq!(token_error(result), TokenError::UserNotFound);
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let (db, _dir) = setup();
        let conn = db.conn();
        let issued = issue(&conn, "u1", TokenPurpose::Login, now()).unwrap();
        let user = redeem(&conn, &issued.value, "ADA@Example.com", TokenPurpose::Login, now());
        assert!(user.is_ok());
    }

    #[test]
    fn purpose_must_match() {
        let (db, _dir) = setup();
        let conn = db.conn();
        let issued = issue(&conn, "u1", TokenPurpose::Login, now()).unwrap();
        let result = redeem(&conn, &issued.value, "ada@example.com", TokenPurpose::Reset, now());
        assert_eq!(token_error(result), TokenError::TokenNotFound);
        assert_eq!(token_count(&conn, TokenPurpose::Login), 1);
    }

    #[test]
    fn reissuing_replaces_the_outstanding_token() {
        let (db, _dir) = setup();
        let conn = db.conn();
        let first = issue(&conn, "u1", TokenPurpose::Login, now()).unwrap();
        let second = issue(&conn, "u1", TokenPurpose::Login, now()).unwrap();
        assert_eq!(token_count(&conn, TokenPurpose::Login), 1);

        let stale = redeem(&conn, &first.value, "ada@example.com", TokenPurpose::Login, now());
        assert_eq!(token_error(stale), TokenError::TokenNotFound);
        assert!(redeem(&conn, &second.value, "ada@example.com", TokenPurpose::Login, now()).is_ok());
    }

    #[test]
    fn peek_does_not_consume() {
        let (db, _dir) = setup();
        let conn = db.conn();
        let issued = issue(&conn, "u1", TokenPurpose::Reset, now()).unwrap();
        peek(&conn, &issued.value, "ada@example.com", TokenPurpose::Reset, now()).unwrap();
        assert_eq!(token_count(&conn, TokenPurpose::Reset), 1);
    }
}
