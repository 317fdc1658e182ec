use crate::ai::reason_check::ReasonChecker;
use crate::auth::auth::AuthUser;
use crate::model::leave_request::{AiVerdict, LeaveRequest, LeaveStatus, LeaveType};
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

pub const MAX_REASON_CHARS: usize = 500;
pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "High fever since last night, clinic appointment at 9:00")]
    pub reason: String,
    #[schema(example = "sick", nullable = true)]
    pub leave_type: Option<LeaveType>,
    #[schema(example = "2026-03-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub end_date: NaiveDate,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct ReviewLeave {
    #[schema(example = "Approved, please bring the clinic note afterwards", nullable = true)]
    pub comment: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by leave status. Teachers default to `pending`
    #[schema(example = "pending")]
    pub status: Option<LeaveStatus>,
    /// Teachers only: filter by student ID
    #[schema(example = 2)]
    pub student_id: Option<i64>,
    /// Teachers only: username substring
    #[schema(example = "student")]
    pub search_name: Option<String>,
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<i64>,
    /// Pagination per page number
    #[schema(example = 10)]
    pub per_page: Option<i64>,
}

#[derive(FromRow)]
pub struct LeaveWithStudent {
    #[sqlx(flatten)]
    pub leave: LeaveRequest,
    pub student_name: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LeaveResponse {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = 2)]
    pub student_id: i64,
    #[schema(example = "student@test.com", nullable = true)]
    pub student_name: Option<String>,
    pub reason: String,
    #[schema(example = "sick", nullable = true)]
    pub leave_type: Option<LeaveType>,
    #[schema(example = "2026-03-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "pending")]
    pub status: LeaveStatus,
    #[schema(example = "valid", nullable = true)]
    pub ai_check: Option<AiVerdict>,
    /// Full assessment returned by the scoring service
    #[schema(value_type = Object, nullable = true)]
    pub ai_details: Option<serde_json::Value>,
    pub teacher_comment: Option<String>,
    /// Original name of the uploaded attachment, if any
    #[schema(example = "clinic_note.pdf", nullable = true)]
    pub attachment: Option<String>,
    #[schema(example = "2026-02-28T08:00:00", format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub reviewed_at: Option<NaiveDateTime>,
}

impl From<LeaveWithStudent> for LeaveResponse {
    fn from(row: LeaveWithStudent) -> Self {
        let ai_details = row.leave.ai_details_json();
        let leave = row.leave;
        LeaveResponse {
            id: leave.id,
            student_id: leave.student_id,
            student_name: row.student_name,
            reason: leave.reason,
            leave_type: leave.leave_type,
            start_date: leave.start_date,
            end_date: leave.end_date,
            status: leave.status,
            ai_check: leave.ai_check,
            ai_details,
            teacher_comment: leave.teacher_comment,
            attachment: leave
                .attachment_path
                .as_deref()
                .map(|p| crate::utils::attachment_store::display_name(p).to_string()),
            created_at: leave.created_at,
            reviewed_at: leave.reviewed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveResponse>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    I64(i64),
    Str(String),
}

const SELECT_WITH_STUDENT: &str = r#"
    SELECT l.*, u.username AS student_name
    FROM leave_requests l
    LEFT JOIN users u ON u.id = l.student_id
"#;

pub(crate) fn internal_error(e: impl std::fmt::Display, context: &str) -> actix_web::Error {
    tracing::error!(error = %e, "{}", context);
    actix_web::error::ErrorInternalServerError("Internal Server Error")
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "message": message }))
}

pub(crate) fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "message": "Leave request not found"
    }))
}

pub(crate) async fn fetch_leave(
    pool: &SqlitePool,
    leave_id: i64,
) -> Result<Option<LeaveWithStudent>, sqlx::Error> {
    sqlx::query_as::<_, LeaveWithStudent>(&format!("{SELECT_WITH_STUDENT} WHERE l.id = ?"))
        .bind(leave_id)
        .fetch_optional(pool)
        .await
}

/// Loads a request the caller may see: teachers see everything, students
/// only their own. Anything else reads as not found.
pub(crate) async fn fetch_visible_leave(
    auth: &AuthUser,
    pool: &SqlitePool,
    leave_id: i64,
) -> actix_web::Result<Option<LeaveWithStudent>> {
    let row = fetch_leave(pool, leave_id)
        .await
        .map_err(|e| internal_error(e, "Failed to fetch leave request"))?;

    Ok(row.filter(|r| auth.is_teacher() || r.leave.is_owned_by(auth.user_id)))
}

/// Trims and bounds the free-text reason. Returns the cleaned text or a message.
pub fn validate_reason(reason: &str) -> Result<&str, &'static str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err("reason must not be empty");
    }
    if reason.chars().count() > MAX_REASON_CHARS {
        return Err("reason must be at most 500 characters");
    }
    Ok(reason)
}

/* =========================
Create leave request (student)
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
#[instrument(name = "create_leave", skip_all, fields(student_id = auth.user_id))]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    checker: web::Data<ReasonChecker>,
    payload: web::Json<CreateLeave>,
) -> actix_web::Result<impl Responder> {
    auth.require_student()?;

    // 1️⃣ validate input
    let reason = match validate_reason(&payload.reason) {
        Ok(r) => r,
        Err(msg) => return Ok(bad_request(msg)),
    };

    if payload.start_date > payload.end_date {
        return Ok(bad_request("start_date cannot be after end_date"));
    }

    // 2️⃣ score the reason; failures degrade to `unavailable`
    let (verdict, assessment) = checker.verdict_for(reason).await;
    let ai_details = assessment
        .map(|a| serde_json::to_string(&a))
        .transpose()
        .map_err(|e| internal_error(e, "Failed to serialize assessment"))?;

    // 3️⃣ insert request
    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (student_id, reason, leave_type, start_date, end_date, status, ai_check, ai_details)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(reason)
    .bind(payload.leave_type)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(LeaveStatus::Pending)
    .bind(verdict)
    .bind(ai_details)
    .execute(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to create leave request"))?;

    let leave_id = result.last_insert_rowid();
    tracing::info!(leave_id, verdict = %verdict, "Leave request submitted");

    match fetch_leave(pool.get_ref(), leave_id)
        .await
        .map_err(|e| internal_error(e, "Failed to reload leave request"))?
    {
        Some(row) => Ok(HttpResponse::Created().json(LeaveResponse::from(row))),
        None => Err(internal_error(leave_id, "Inserted leave request vanished")),
    }
}

/* =========================
Review (teacher)
========================= */
async fn review_leave(
    auth: &AuthUser,
    pool: &SqlitePool,
    leave_id: i64,
    decision: LeaveStatus,
    payload: Option<web::Json<ReviewLeave>>,
) -> actix_web::Result<HttpResponse> {
    auth.require_teacher()?;

    let comment = payload
        .and_then(|p| p.into_inner().comment)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    if comment
        .as_deref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
    {
        return Ok(bad_request("comment must be at most 500 characters"));
    }

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?,
            teacher_comment = ?,
            reviewed_at = CURRENT_TIMESTAMP,
            reviewed_by = ?
        WHERE id = ?
        AND status = ?
        "#,
    )
    .bind(decision)
    .bind(comment)
    .bind(auth.user_id)
    .bind(leave_id)
    .bind(LeaveStatus::Pending)
    .execute(pool)
    .await
    .map_err(|e| internal_error(e, "Review leave failed"))?;

    if result.rows_affected() == 0 {
        return Ok(bad_request("Leave request not found or already processed"));
    }

    tracing::info!(leave_id, decision = %decision, teacher_id = auth.user_id, "Leave reviewed");

    let message = match decision {
        LeaveStatus::Approved => "Leave approved",
        _ => "Leave rejected",
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": message,
        "status": decision
    })))
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = i64, Path, description = "ID of the leave request to approve")
    ),
    request_body(content = ReviewLeave, description = "Optional teacher comment"),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "message": "Leave approved",
            "status": "approved"
        })),
        (status = 400, description = "Leave request not found or already processed", body = Object, example = json!({
            "message": "Leave request not found or already processed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
    payload: Option<web::Json<ReviewLeave>>,
) -> actix_web::Result<impl Responder> {
    review_leave(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        LeaveStatus::Approved,
        payload,
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = i64, Path, description = "ID of the leave request to reject")
    ),
    request_body(content = ReviewLeave, description = "Optional teacher comment"),
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "message": "Leave rejected",
            "status": "rejected"
        })),
        (status = 400, description = "Leave request not found or already processed", body = Object, example = json!({
            "message": "Leave request not found or already processed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
    payload: Option<web::Json<ReviewLeave>>,
) -> actix_web::Result<impl Responder> {
    review_leave(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        LeaveStatus::Rejected,
        payload,
    )
    .await
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = i64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    match fetch_visible_leave(&auth, pool.get_ref(), leave_id).await? {
        Some(row) => Ok(HttpResponse::Ok().json(LeaveResponse::from(row))),
        None => Ok(not_found()),
    }
}

/// Students get their own history; teachers get the review queue.
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    // -------------------------
    // Pagination
    // -------------------------
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let Ok(page) = u32::try_from(query.page.unwrap_or(1).max(1)) else {
        return Ok(bad_request("page is out of range"));
    };
    // at most u32::MAX * 100, well inside i64
    let offset = (i64::from(page) - 1) * per_page;

    // -------------------------
    // WHERE clause
    // -------------------------
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    let search_name = query
        .search_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let status = if auth.is_teacher() {
        if let Some(student_id) = query.student_id {
            where_sql.push_str(" AND l.student_id = ?");
            args.push(FilterValue::I64(student_id));
        }
        if let Some(name) = search_name {
            // literal substring match; LIKE would treat `%` and `_` as wildcards
            where_sql.push_str(" AND instr(u.username, ?) > 0");
            args.push(FilterValue::Str(name.to_lowercase()));
        }
        // the plain review queue shows pending work only
        match query.status {
            Some(s) => Some(s),
            None if query.student_id.is_none() && search_name.is_none() => {
                Some(LeaveStatus::Pending)
            }
            None => None,
        }
    } else {
        where_sql.push_str(" AND l.student_id = ?");
        args.push(FilterValue::I64(auth.user_id));
        query.status
    };

    if let Some(status) = status {
        where_sql.push_str(" AND l.status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!(
        "SELECT COUNT(*) FROM leave_requests l LEFT JOIN users u ON u.id = l.student_id{}",
        where_sql
    );

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::I64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
        };
    }

    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to count leave requests"))?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        "{SELECT_WITH_STUDENT} {where_sql} ORDER BY l.created_at DESC, l.id DESC LIMIT ? OFFSET ?"
    );

    let mut data_q = sqlx::query_as::<_, LeaveWithStudent>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::I64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }

    let leaves = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to fetch leave list"))?;

    let response = LeaveListResponse {
        data: leaves.into_iter().map(LeaveResponse::from).collect(),
        page,
        per_page: u32::try_from(per_page).unwrap_or(100),
        total,
    };

    Ok(HttpResponse::Ok().json(response))
}
