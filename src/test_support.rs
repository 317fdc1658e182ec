//! Shared fixtures for handler tests: an in-memory database, a temporary
//! upload directory and a reason checker with no API key.

use actix_web::http::header;
use actix_web::test::TestRequest;
use actix_web::web;
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::ai::reason_check::{ReasonChecker, ReasonCheckerConfig};
use crate::auth::jwt::generate_access_token;
use crate::config::Config;
use crate::db::{init_db, insert_user_if_absent};
use crate::model::role::Role;

pub struct TestEnv {
    pub pool: SqlitePool,
    pub config: Config,
    pub checker: web::Data<ReasonChecker>,
    pub upload_dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let upload_dir = tempfile::tempdir().expect("tempdir");
        let config = Config::for_tests(&upload_dir.path().to_string_lossy());
        let checker = ReasonChecker::new(ReasonCheckerConfig::from(&config)).expect("checker");
        Self::with_checker(config, checker, upload_dir).await
    }

    pub async fn with_checker(config: Config, checker: ReasonChecker, upload_dir: TempDir) -> Self {
        let pool = init_db(&config.database_url, config.db_max_connections)
            .await
            .expect("in-memory database");
        Self {
            pool,
            config,
            checker: web::Data::new(checker),
            upload_dir,
        }
    }

    /// Creates a user and returns its id with a fresh access token.
    pub async fn user(&self, username: &str, role: Role) -> (i64, String) {
        insert_user_if_absent(&self.pool, username, "password", role)
            .await
            .expect("insert user");
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .expect("user id");
        let token = generate_access_token(
            id,
            username.to_string(),
            role,
            &self.config.jwt_secret,
            self.config.access_token_ttl,
        )
        .expect("token");
        (id, token)
    }

    /// Inserts a pending sick-leave request directly.
    pub async fn insert_leave(&self, student_id: i64, reason: &str) -> i64 {
        sqlx::query(
            r#"
            INSERT INTO leave_requests (student_id, reason, leave_type, start_date, end_date, ai_check)
            VALUES (?, ?, 'sick', '2026-03-01', '2026-03-02', 'unavailable')
            "#,
        )
        .bind(student_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .expect("insert leave")
        .last_insert_rowid()
    }

    pub async fn set_status(&self, leave_id: i64, status: &str) {
        sqlx::query("UPDATE leave_requests SET status = ? WHERE id = ?")
            .bind(status)
            .bind(leave_id)
            .execute(&self.pool)
            .await
            .expect("set status");
    }
}

/// The rate limiter keys on the peer address, which test requests lack by default.
pub fn with_peer(req: TestRequest) -> TestRequest {
    req.peer_addr("127.0.0.1:40000".parse().expect("socket addr"))
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

/// Builds the service the way `main` does, minus logging and Swagger.
#[macro_export]
macro_rules! test_app {
    ($env:expr) => {{
        let env = &$env;
        let config = env.config.clone();
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new(env.pool.clone()))
                .app_data(actix_web::web::Data::new(env.config.clone()))
                .app_data(env.checker.clone())
                .configure(move |cfg| $crate::routes::configure(cfg, config.clone())),
        )
        .await
    }};
}
