use chrono::NaiveDateTime;
use serde::Serialize;

use crate::model::role::Role;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
    pub last_login_at: Option<NaiveDateTime>,
}
