//! Shared database schema, migrations, and query builders.
//!
//! Every builder returns a [`Built`] pair of SQL text and bound values for
//! `SqliteQueryBuilder`; the server decides how to execute it.

pub mod email_log;
pub mod invitations;
pub mod migrations;
pub mod organizations;
pub mod sessions;
pub mod statuses;
pub mod tables;
pub mod teams;
pub mod tokens;
pub mod users;

// Re-export tables for convenience
pub use tables::*;

/// SQL text plus bound parameters.
pub type Built = (String, sea_query::Values);
