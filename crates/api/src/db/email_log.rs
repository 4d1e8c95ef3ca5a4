//! Email audit log query builders.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::EmailLog;

/// Record one outgoing email.
pub fn insert(
    id: &str,
    email_type: &str,
    to_email: &str,
    from_email: &str,
    subject: &str,
    body: &str,
) -> Built {
    Query::insert()
        .into_table(EmailLog::Table)
        .columns([
            EmailLog::Id,
            EmailLog::EmailType,
            EmailLog::ToEmail,
            EmailLog::FromEmail,
            EmailLog::Subject,
            EmailLog::Body,
        ])
        .values_panic([
            id.into(),
            email_type.into(),
            to_email.into(),
            from_email.into(),
            subject.into(),
            body.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Most recent emails sent to one address.
/// Returns: email_type, subject, body, created_at.
pub fn list_for_recipient(to_email: &str, limit: u64) -> Built {
    Query::select()
        .columns([
            EmailLog::EmailType,
            EmailLog::Subject,
            EmailLog::Body,
            EmailLog::CreatedAt,
        ])
        .from(EmailLog::Table)
        .and_where(Expr::col(EmailLog::ToEmail).eq(to_email))
        .order_by(EmailLog::CreatedAt, Order::Desc)
        .order_by(EmailLog::Id, Order::Desc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}
