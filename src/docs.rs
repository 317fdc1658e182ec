use crate::ai::reason_check::Assessment;
use crate::api::leave_request::{
    CreateLeave, LeaveFilter, LeaveListResponse, LeaveResponse, ReviewLeave,
};
use crate::api::stats::{LeaveStats, StudentCount, TypeCount};
use crate::auth::auth::AuthUser;
use crate::model::leave_request::{AiVerdict, LeaveStatus, LeaveType};
use crate::model::role::Role;
use crate::models::{LoginReqDto, LoginResponse, UserReq};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Leave API",
        version = "1.0.0",
        description = r#"
## Campus Leave Service

Students submit leave applications, an AI reviewer scores the stated reason,
and teachers approve or reject pending requests.

### 🔹 Key Features
- **Leave applications**
  - Submit with reason, type and dates, optionally attach a certificate
- **AI reason check**
  - Each reason is graded on authenticity, urgency, reasonableness and compliance
- **Review**
  - Teachers work through the pending queue and leave comments
- **Leave notes**
  - Approved requests can be downloaded as a Word document
- **Statistics**
  - Counts per status, leave type and student

### 🔐 Security
Endpoints under `/api` require a **JWT Bearer** access token obtained from `/auth/login`.
Reviewing and statistics are restricted to **teachers**.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,

        crate::api::attachment::upload_attachment,
        crate::api::attachment::download_attachment,
        crate::api::document::download_document,

        crate::api::stats::leave_stats
    ),
    components(
        schemas(
            UserReq,
            LoginReqDto,
            LoginResponse,
            AuthUser,
            Role,
            CreateLeave,
            ReviewLeave,
            LeaveFilter,
            LeaveResponse,
            LeaveListResponse,
            LeaveStatus,
            LeaveType,
            AiVerdict,
            Assessment,
            LeaveStats,
            TypeCount,
            StudentCount
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token rotation and registration"),
        (name = "Leave", description = "Leave application and review APIs"),
        (name = "Stats", description = "Leave statistics for teachers"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
