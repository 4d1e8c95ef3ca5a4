use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use teambeat_api::db::{Built, migrations::MIGRATIONS};

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(db_path: &Path) -> Result<Db> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let conn = Connection::open(db_path).context("opening SQLite database")?;

    // Enable WAL mode for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query execution helpers
// ---------------------------------------------------------------------------

/// Convert sea-query bound values into rusqlite parameters.
pub fn sql_params(values: &sea_query::Values) -> Vec<SqlValue> {
    use sea_query::Value;

    values
        .0
        .iter()
        .map(|v| match v {
            Value::Bool(Some(b)) => SqlValue::Integer(i64::from(*b)),
            Value::TinyInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
            Value::SmallInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
            Value::Int(Some(i)) => SqlValue::Integer(i64::from(*i)),
            Value::BigInt(Some(i)) => SqlValue::Integer(*i),
            Value::TinyUnsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            Value::SmallUnsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            Value::Unsigned(Some(i)) => SqlValue::Integer(i64::from(*i)),
            Value::BigUnsigned(Some(i)) => SqlValue::Integer(*i as i64),
            Value::Float(Some(f)) => SqlValue::Real(f64::from(*f)),
            Value::Double(Some(f)) => SqlValue::Real(*f),
            Value::String(Some(s)) => SqlValue::Text(s.as_str().to_string()),
            Value::Char(Some(c)) => SqlValue::Text(c.to_string()),
            Value::Bytes(Some(b)) => SqlValue::Blob(b.as_slice().to_vec()),
            _ => SqlValue::Null,
        })
        .collect()
}

/// Run an INSERT / UPDATE / DELETE. Returns the number of affected rows.
pub fn execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, rusqlite::params_from_iter(sql_params(&values)))
}

/// Fetch at most one row.
pub fn query_one<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(&sql, rusqlite::params_from_iter(sql_params(&values)), f)
        .optional()
}

/// Fetch every row.
pub fn query_all<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(sql_params(&values)), f)?;
    rows.collect()
}

/// Evaluate a `SELECT COUNT(*) > 0 ...` style query.
pub fn query_flag(conn: &Connection, built: Built) -> rusqlite::Result<bool> {
    Ok(query_one(conn, built, |row| row.get::<_, bool>(0))?.unwrap_or(false))
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub password_salt: Option<String>,
}

impl UserRow {
    pub fn display_name(&self) -> String {
        teambeat_api::service::display_name(&self.first_name, &self.last_name, &self.email)
    }
}

/// Map a row from `db::users` selects.
pub fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password_hash: row.get(5)?,
        password_salt: row.get(6)?,
    })
}

#[derive(Debug, Clone)]
pub struct OrgUserRow {
    pub id: String,
    pub is_admin: bool,
    pub active: bool,
}

/// Map a row from `db::organizations::get_org_user*`.
pub fn org_user_from_row(row: &Row<'_>) -> rusqlite::Result<OrgUserRow> {
    Ok(OrgUserRow {
        id: row.get(0)?,
        is_admin: row.get(3)?,
        active: row.get(4)?,
    })
}

/// An organization user joined with their user record.
#[derive(Debug, Clone)]
pub struct OrgMemberRow {
    pub org_user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
}

impl OrgMemberRow {
    pub fn display_name(&self) -> String {
        teambeat_api::service::display_name(&self.first_name, &self.last_name, &self.email)
    }
}

/// Map a row from `db::organizations::list_active_users` / `search`.
pub fn org_member_from_row(row: &Row<'_>) -> rusqlite::Result<OrgMemberRow> {
    Ok(OrgMemberRow {
        org_user_id: row.get(0)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        is_admin: row.get(5)?,
    })
}

#[derive(Debug, Clone)]
pub struct TeamRow {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    pub team_lead_id: Option<String>,
}

/// Map a row from `db::teams::get_by_id`.
pub fn team_from_row(row: &Row<'_>) -> rusqlite::Result<TeamRow> {
    Ok(TeamRow {
        id: row.get(0)?,
        name: row.get(1)?,
        organization_id: row.get(2)?,
        team_lead_id: row.get(3)?,
    })
}

/// A team member or team admin joined with their user record.
#[derive(Debug, Clone)]
pub struct TeamPersonRow {
    pub id: String,
    pub org_user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl TeamPersonRow {
    pub fn display_name(&self) -> String {
        teambeat_api::service::display_name(&self.first_name, &self.last_name, &self.email)
    }
}

/// Map a row from `db::teams::list_members` / `list_admins`.
pub fn team_person_from_row(row: &Row<'_>) -> rusqlite::Result<TeamPersonRow> {
    Ok(TeamPersonRow {
        id: row.get(0)?,
        org_user_id: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
    })
}
