use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::auth::password::hash_password;
use crate::model::role::Role;

/// Opens the pool, creating the database file if needed.
///
/// `sqlite::memory:` gives every connection its own database, so callers
/// using it should keep `max_connections` at 1.
pub async fn init_db(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid DATABASE_URL {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        username      TEXT    NOT NULL UNIQUE,
        password_hash TEXT    NOT NULL,
        role          TEXT    NOT NULL CHECK (role IN ('student', 'teacher')),
        created_at    TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
        last_login_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS refresh_tokens (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    INTEGER NOT NULL REFERENCES users(id),
        jti        TEXT    NOT NULL UNIQUE,
        expires_at INTEGER NOT NULL,
        revoked    INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leave_requests (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id      INTEGER NOT NULL,
        reason          TEXT    NOT NULL,
        leave_type      TEXT,
        start_date      TEXT    NOT NULL,
        end_date        TEXT    NOT NULL,
        status          TEXT    NOT NULL DEFAULT 'pending',
        ai_check        TEXT,
        teacher_comment TEXT,
        attachment_path TEXT,
        ai_details      TEXT,
        created_at      TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
        reviewed_at     TEXT,
        reviewed_by     INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leave_requests_student ON leave_requests (student_id)",
    "CREATE INDEX IF NOT EXISTS idx_leave_requests_status ON leave_requests (status)",
];

/// Creates the tables when they are missing. Existing tables are left as is.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to create schema")?;
    }
    Ok(())
}

/// Inserts a user unless the username is already present. Returns true when inserted.
pub async fn insert_user_if_absent(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    role: Role,
) -> Result<bool> {
    let hashed = hash_password(password).map_err(|e| anyhow::anyhow!("hash failed: {e}"))?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, role)
        VALUES (?, ?, ?)
        ON CONFLICT(username) DO NOTHING
        "#,
    )
    .bind(username)
    .bind(hashed)
    .bind(role)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Demo accounts for a fresh install.
pub async fn seed_demo_users(pool: &SqlitePool) -> Result<()> {
    let accounts = [
        ("teacher@test.com", "654321", Role::Teacher),
        ("student@test.com", "123456", Role::Student),
        ("student2@test.com", "123456", Role::Student),
    ];

    for (username, password, role) in accounts {
        if insert_user_if_absent(pool, username, password, role).await? {
            info!(username, role = %role, "Seeded demo user");
        }
    }
    Ok(())
}
