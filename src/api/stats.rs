use std::collections::BTreeMap;

use crate::api::leave_request::internal_error;
use crate::auth::auth::AuthUser;
use crate::model::leave_request::LeaveStatus;
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum::IntoEnumIterator;
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, FromRow, ToSchema)]
pub struct TypeCount {
    /// `unspecified` when the student gave no type
    #[schema(example = "sick")]
    pub leave_type: String,
    #[schema(example = 4)]
    pub count: i64,
}

#[derive(Serialize, Deserialize, FromRow, ToSchema)]
pub struct StudentCount {
    #[schema(example = 2)]
    pub student_id: i64,
    #[schema(example = "student@test.com", nullable = true)]
    pub username: Option<String>,
    #[schema(example = 3)]
    pub count: i64,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "total": 5,
    "by_status": {"approved": 2, "pending": 2, "rejected": 1},
    "by_type": [{"leave_type": "sick", "count": 3}, {"leave_type": "personal", "count": 2}],
    "by_student": [{"student_id": 2, "username": "student@test.com", "count": 5}]
}))]
pub struct LeaveStats {
    pub total: i64,
    /// Every status is present, zero when unused
    pub by_status: BTreeMap<String, i64>,
    pub by_type: Vec<TypeCount>,
    pub by_student: Vec<StudentCount>,
}

/// Leave statistics for teachers
#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Leave statistics", body = LeaveStats),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Stats"
)]
pub async fn leave_stats(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
) -> actix_web::Result<impl Responder> {
    auth.require_teacher()?;

    let status_rows = sqlx::query_as::<_, (LeaveStatus, i64)>(
        "SELECT status, COUNT(*) FROM leave_requests GROUP BY status",
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to count leave statuses"))?;

    let mut by_status: BTreeMap<String, i64> =
        LeaveStatus::iter().map(|s| (s.to_string(), 0)).collect();
    for (status, count) in status_rows {
        by_status.insert(status.to_string(), count);
    }

    let by_type = sqlx::query_as::<_, TypeCount>(
        r#"
        SELECT COALESCE(leave_type, 'unspecified') AS leave_type, COUNT(*) AS count
        FROM leave_requests
        GROUP BY COALESCE(leave_type, 'unspecified')
        ORDER BY count DESC, leave_type
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to count leave types"))?;

    let by_student = sqlx::query_as::<_, StudentCount>(
        r#"
        SELECT l.student_id AS student_id, u.username AS username, COUNT(*) AS count
        FROM leave_requests l
        LEFT JOIN users u ON u.id = l.student_id
        GROUP BY l.student_id, u.username
        ORDER BY count DESC, l.student_id
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to count leave per student"))?;

    let total = by_status.values().sum();

    Ok(HttpResponse::Ok().json(LeaveStats {
        total,
        by_status,
        by_type,
        by_student,
    }))
}
