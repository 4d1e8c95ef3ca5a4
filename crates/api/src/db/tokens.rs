//! Login / reset token query builders.

use sea_query::{Asterisk, Expr, Func, OnConflict, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::UserTokens;

/// Insert a token, replacing any outstanding token of the same type for the user.
pub fn upsert(id: &str, user_id: &str, token_hash: &str, token_type: &str, expires_at: &str) -> Built {
    Query::insert()
        .into_table(UserTokens::Table)
        .columns([
            UserTokens::Id,
            UserTokens::UserId,
            UserTokens::TokenHash,
            UserTokens::TokenType,
            UserTokens::ExpiresAt,
        ])
        .values_panic([
            id.into(),
            user_id.into(),
            token_hash.into(),
            token_type.into(),
            expires_at.into(),
        ])
        .on_conflict(
            OnConflict::columns([UserTokens::UserId, UserTokens::TokenType])
                .update_columns([UserTokens::Id, UserTokens::TokenHash, UserTokens::ExpiresAt])
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// Find a token row. Returns: id, expires_at.
pub fn find(user_id: &str, token_type: &str, token_hash: &str) -> Built {
    Query::select()
        .columns([UserTokens::Id, UserTokens::ExpiresAt])
        .from(UserTokens::Table)
        .and_where(Expr::col(UserTokens::UserId).eq(user_id))
        .and_where(Expr::col(UserTokens::TokenType).eq(token_type))
        .and_where(Expr::col(UserTokens::TokenHash).eq(token_hash))
        .build(SqliteQueryBuilder)
}

/// Delete one token row by id. Affects 0 rows if someone else already did.
pub fn delete_by_id(id: &str) -> Built {
    Query::delete()
        .from_table(UserTokens::Table)
        .and_where(Expr::col(UserTokens::Id).eq(id))
        .build(SqliteQueryBuilder)
}

/// Count tokens a user holds for one purpose.
pub fn count_for_user(user_id: &str, token_type: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(UserTokens::Table)
        .and_where(Expr::col(UserTokens::UserId).eq(user_id))
        .and_where(Expr::col(UserTokens::TokenType).eq(token_type))
        .build(SqliteQueryBuilder)
}
