use crate::api::attachment::attachment_response;
use crate::api::leave_request::{fetch_visible_leave, internal_error, not_found};
use crate::auth::auth::AuthUser;
use crate::document::{leave_note_filename, render_leave_note};
use crate::model::leave_request::LeaveStatus;
use actix_web::{HttpResponse, Responder, web};
use sqlx::SqlitePool;

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Download the printable leave note of an approved request
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}/document",
    params(
        ("leave_id" = i64, Path, description = "ID of the leave request")
    ),
    responses(
        (status = 200, description = "Leave note (.docx)"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Leave request has not been approved", body = Object, example = json!({
            "message": "Leave request has not been approved"
        })),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn download_document(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let row = match fetch_visible_leave(&auth, pool.get_ref(), leave_id).await? {
        Some(row) => row,
        None => return Ok(not_found()),
    };

    if row.leave.status != LeaveStatus::Approved {
        return Ok(HttpResponse::Forbidden().json(serde_json::json!({
            "message": "Leave request has not been approved"
        })));
    }

    let generated_at = chrono::Local::now().naive_local();
    let filename = leave_note_filename(&row.leave, generated_at);
    let student_name = row.student_name.unwrap_or_default();

    let bytes = web::block(move || render_leave_note(&row.leave, &student_name, generated_at))
        .await?
        .map_err(|e| internal_error(e, "Failed to render leave note"))?;

    tracing::info!(leave_id, requested_by = auth.user_id, "Leave note generated");

    Ok(attachment_response(bytes, &filename, DOCX_CONTENT_TYPE))
}

#[cfg(test)]
mod tests {
    use crate::model::role::Role;
    use crate::test_support::{TestEnv, bearer, with_peer};
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn only_approved_requests_render() {
        let env = TestEnv::new().await;
        let app = crate::test_app!(env);
        let (student_id, student) = env.user("student@test.com", Role::Student).await;
        let (_, other) = env.user("student2@test.com", Role::Student).await;
        let leave_id = env.insert_leave(student_id, "Surgery").await;
        let uri = format!("/api/leave/{leave_id}/document");

        let req = with_peer(test::TestRequest::get().uri(&uri))
            .insert_header(bearer(&student))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        env.set_status(leave_id, "approved").await;

        let req = with_peer(test::TestRequest::get().uri(&uri))
            .insert_header(bearer(&other))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = with_peer(test::TestRequest::get().uri(&uri))
            .insert_header(bearer(&student))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!("leave_{leave_id}_")));
        assert!(disposition.contains(".docx"));
        let body = test::read_body(resp).await;
        assert_eq!(&body[..2], b"PK");
    }
}
