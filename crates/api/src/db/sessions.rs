//! Server-side web session query builders.

use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::WebSessions;

/// Load session data by hashed id, unless it has been idle since before
/// `cutoff`. Returns: data.
pub fn get(id_hash: &str, cutoff: &str) -> Built {
    Query::select()
        .column(WebSessions::Data)
        .from(WebSessions::Table)
        .and_where(Expr::col(WebSessions::IdHash).eq(id_hash))
        .and_where(Expr::col(WebSessions::UpdatedAt).gte(cutoff))
        .build(SqliteQueryBuilder)
}

/// Insert or overwrite session data.
pub fn save(id_hash: &str, data: &str, updated_at: &str) -> Built {
    Query::insert()
        .into_table(WebSessions::Table)
        .columns([WebSessions::IdHash, WebSessions::Data, WebSessions::UpdatedAt])
        .values_panic([id_hash.into(), data.into(), updated_at.into()])
        .on_conflict(
            OnConflict::column(WebSessions::IdHash)
                .update_columns([WebSessions::Data, WebSessions::UpdatedAt])
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// Delete a session.
pub fn delete(id_hash: &str) -> Built {
    Query::delete()
        .from_table(WebSessions::Table)
        .and_where(Expr::col(WebSessions::IdHash).eq(id_hash))
        .build(SqliteQueryBuilder)
}

/// Drop sessions idle since before `cutoff`.
pub fn delete_stale(cutoff: &str) -> Built {
    Query::delete()
        .from_table(WebSessions::Table)
        .and_where(Expr::col(WebSessions::UpdatedAt).lt(cutoff))
        .build(SqliteQueryBuilder)
}
