use std::path::PathBuf;

use crate::api::leave_request::{fetch_visible_leave, internal_error, not_found};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::model::leave_request::LeaveStatus;
use crate::utils::attachment_store;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
pub struct UploadQuery {
    /// Original file name; its extension decides whether the upload is accepted
    pub filename: String,
}

pub(crate) fn attachment_response(
    bytes: Vec<u8>,
    filename: &str,
    content_type: &str,
) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename.to_string())],
        })
        .body(bytes)
}

/// Points a pending request at `stored`, provided its attachment is still
/// `previous`. Returns false when the row moved on in the meantime.
pub(crate) async fn replace_attachment(
    pool: &SqlitePool,
    leave_id: i64,
    student_id: i64,
    previous: Option<&str>,
    stored: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET attachment_path = ?
        WHERE id = ?
        AND student_id = ?
        AND status = ?
        AND attachment_path IS ?
        "#,
    )
    .bind(stored)
    .bind(leave_id)
    .bind(student_id)
    .bind(LeaveStatus::Pending)
    .bind(previous)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Upload or replace the attachment of a pending request
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/attachment",
    params(
        ("leave_id" = i64, Path, description = "ID of the leave request"),
        UploadQuery
    ),
    request_body(content = String, description = "Raw file contents", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Attachment stored", body = Object, example = json!({
            "message": "Attachment uploaded",
            "attachment": "clinic_note.pdf"
        })),
        (status = 400, description = "Unsupported file type, empty body or request not pending"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Another upload replaced the attachment first")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn upload_attachment(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    path: web::Path<i64>,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    auth.require_student()?;
    let leave_id = path.into_inner();

    if attachment_store::allowed_extension(&query.filename).is_none() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Only PDF, Word documents or images may be uploaded"
        })));
    }
    if body.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Attachment must not be empty"
        })));
    }

    let row = match fetch_visible_leave(&auth, pool.get_ref(), leave_id).await? {
        Some(row) => row,
        None => return Ok(not_found()),
    };
    if row.leave.status != LeaveStatus::Pending {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Attachments can only be changed while the request is pending"
        })));
    }

    let dir = PathBuf::from(&config.upload_dir);
    let original = query.into_inner().filename;
    let stored = web::block({
        let dir = dir.clone();
        move || attachment_store::save(&dir, &original, &body)
    })
    .await?
    .map_err(|e| internal_error(e, "Failed to store attachment"))?;

    let previous = row.leave.attachment_path;
    let swapped = replace_attachment(
        pool.get_ref(),
        leave_id,
        auth.user_id,
        previous.as_deref(),
        &stored,
    )
    .await
    .map_err(|e| internal_error(e, "Failed to record attachment"))?;

    // the loser of a race or a late review keeps nothing on disk
    let obsolete = if swapped { previous } else { Some(stored.clone()) };
    if let Some(name) = obsolete {
        let dir = dir.clone();
        let removed = web::block(move || attachment_store::remove(&dir, &name)).await?;
        if let Err(e) = removed {
            tracing::warn!(error = %e, leave_id, "Failed to remove obsolete attachment");
        }
    }

    if !swapped {
        return match fetch_visible_leave(&auth, pool.get_ref(), leave_id).await? {
            Some(row) if row.leave.status == LeaveStatus::Pending => {
                Ok(HttpResponse::Conflict().json(json!({
                    "message": "Attachment was changed by another upload, please retry"
                })))
            }
            _ => Ok(HttpResponse::BadRequest().json(json!({
                "message": "Leave request not found or already processed"
            }))),
        };
    }

    tracing::info!(leave_id, stored = %stored, "Attachment uploaded");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Attachment uploaded",
        "attachment": attachment_store::display_name(&stored)
    })))
}

/// Download the attachment of a leave request
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}/attachment",
    params(
        ("leave_id" = i64, Path, description = "ID of the leave request")
    ),
    responses(
        (status = 200, description = "Attachment file"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No attachment or request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn download_attachment(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let stored = match fetch_visible_leave(&auth, pool.get_ref(), leave_id).await? {
        Some(row) => row.leave.attachment_path,
        None => return Ok(not_found()),
    };
    let Some(stored) = stored else {
        return Ok(HttpResponse::NotFound().json(json!({
            "message": "No attachment for this leave request"
        })));
    };

    let dir = PathBuf::from(&config.upload_dir);
    let name = stored.clone();
    let bytes = match web::block(move || attachment_store::read(&dir, &name)).await? {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(leave_id, stored = %stored, "Attachment file missing on disk");
            return Ok(HttpResponse::NotFound().json(json!({
                "message": "No attachment for this leave request"
            })));
        }
        Err(e) => return Err(internal_error(e, "Failed to read attachment")),
    };

    let display = attachment_store::display_name(&stored);
    Ok(attachment_response(
        bytes,
        display,
        attachment_store::content_type_for(display),
    ))
}

#[cfg(test)]
mod tests {
    use super::replace_attachment;
    use crate::model::role::Role;
    use crate::test_support::{TestEnv, bearer, with_peer};
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn upload_then_download_round_trip() {
        let env = TestEnv::new().await;
        let app = crate::test_app!(env);
        let (student_id, student) = env.user("student@test.com", Role::Student).await;
        let (_, teacher) = env.user("teacher@test.com", Role::Teacher).await;
        let leave_id = env.insert_leave(student_id, "Clinic visit").await;

        let req = with_peer(test::TestRequest::put().uri(&format!(
            "/api/leave/{leave_id}/attachment?filename=clinic%20note.PDF"
        )))
        .insert_header(bearer(&student))
        .set_payload("%PDF-1.4 fake")
        .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["attachment"], "clinic_note.PDF");

        let req = with_peer(
            test::TestRequest::get().uri(&format!("/api/leave/{leave_id}/attachment")),
        )
        .insert_header(bearer(&teacher))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap().to_str().unwrap(),
            "application/pdf"
        );
        let disposition = resp
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("clinic_note.PDF"));
        assert_eq!(test::read_body(resp).await.as_ref(), b"%PDF-1.4 fake");

        // replacing keeps exactly one stored file
        let req = with_peer(test::TestRequest::put().uri(&format!(
            "/api/leave/{leave_id}/attachment?filename=scan.png"
        )))
        .insert_header(bearer(&student))
        .set_payload("png bytes")
        .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        let files = std::fs::read_dir(env.upload_dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[actix_web::test]
    async fn rejects_bad_uploads() {
        let env = TestEnv::new().await;
        let app = crate::test_app!(env);
        let (student_id, student) = env.user("student@test.com", Role::Student).await;
        let (_, other) = env.user("student2@test.com", Role::Student).await;
        let leave_id = env.insert_leave(student_id, "Clinic visit").await;
        let uri = |name: &str| format!("/api/leave/{leave_id}/attachment?filename={name}");

        let req = with_peer(test::TestRequest::put().uri(&uri("run.exe")))
            .insert_header(bearer(&student))
            .set_payload("MZ")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = with_peer(test::TestRequest::put().uri(&uri("empty.pdf")))
            .insert_header(bearer(&student))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = with_peer(test::TestRequest::put().uri(&uri("note.pdf")))
            .insert_header(bearer(&other))
            .set_payload("x")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        env.set_status(leave_id, "approved").await;
        let req = with_peer(test::TestRequest::put().uri(&uri("note.pdf")))
            .insert_header(bearer(&student))
            .set_payload("x")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn download_without_attachment_is_not_found() {
        let env = TestEnv::new().await;
        let app = crate::test_app!(env);
        let (student_id, student) = env.user("student@test.com", Role::Student).await;
        let leave_id = env.insert_leave(student_id, "Clinic visit").await;

        let req = with_peer(
            test::TestRequest::get().uri(&format!("/api/leave/{leave_id}/attachment")),
        )
        .insert_header(bearer(&student))
        .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn body_over_the_size_cap_is_refused() {
        let env = TestEnv::new().await;
        let app = crate::test_app!(env);
        let (student_id, student) = env.user("student@test.com", Role::Student).await;
        let leave_id = env.insert_leave(student_id, "Clinic visit").await;

        let oversized = vec![b'x'; env.config.max_attachment_bytes + 1];
        let req = with_peer(test::TestRequest::put().uri(&format!(
            "/api/leave/{leave_id}/attachment?filename=scan.pdf"
        )))
        .insert_header(bearer(&student))
        .set_payload(oversized)
        .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(std::fs::read_dir(env.upload_dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn replacing_from_a_stale_view_does_not_overwrite() {
        let env = TestEnv::new().await;
        let (student_id, _) = env.user("student@test.com", Role::Student).await;
        let leave_id = env.insert_leave(student_id, "Clinic visit").await;

        // two uploads both saw "no attachment"; only the first may win
        assert!(replace_attachment(&env.pool, leave_id, student_id, None, "first.pdf").await.unwrap());
        assert!(!replace_attachment(&env.pool, leave_id, student_id, None, "second.pdf").await.unwrap());

        let current: Option<String> =
            sqlx::query_scalar("SELECT attachment_path FROM leave_requests WHERE id = ?")
                .bind(leave_id)
                .fetch_one(&env.pool)
                .await
                .unwrap();
        assert_eq!(current.as_deref(), Some("first.pdf"));

        assert!(
            replace_attachment(&env.pool, leave_id, student_id, Some("first.pdf"), "third.pdf")
                .await
                .unwrap()
        );

        // another student cannot touch it
        assert!(
            !replace_attachment(&env.pool, leave_id, student_id + 1, Some("third.pdf"), "x.pdf")
                .await
                .unwrap()
        );
    }
}
