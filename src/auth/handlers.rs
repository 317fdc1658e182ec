use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::{role::Role, user::User},
    models::{Claims, LoginReqDto, LoginResponse, TokenType, UserReq, normalize_username},
};
use actix_web::{HttpRequest, HttpResponse, Responder, get, web};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument};
use crate::utils::username_registry::USERNAMES;

/// Inserts a new student and records the name as taken
async fn insert_user(username: &str, password: &str, pool: &SqlitePool) -> Result<(), HttpResponse> {
    let hashed = hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        HttpResponse::InternalServerError().json(json!({
            "error": "Failed to register user"
        }))
    })?;

    let result = sqlx::query(r#"INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)"#)
        .bind(username)
        .bind(hashed)
        .bind(Role::Student)
        .execute(pool)
        .await;

    match result {
        Ok(_) => {
            USERNAMES.remember(username).await;
            Ok(())
        }
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return Err(HttpResponse::Conflict().json(json!({
                        "error": "Username already exists"
                    })));
                }
            }

            error!(error = %e, "Failed to insert user");
            Err(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to register user"
            })))
        }
    }
}

/// Student self-registration
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = UserReq,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Empty username or password"),
        (status = 409, description = "Username already taken")
    ),
    tag = "Auth"
)]
pub async fn register(user: web::Json<UserReq>, pool: web::Data<SqlitePool>) -> impl Responder {
    let username = normalize_username(&user.username);
    let password = &user.password;

    if username.is_empty() || password.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Username and password must not be empty"
        }));
    }

    if !USERNAMES.is_available(pool.get_ref(), &username).await {
        return HttpResponse::Conflict().json(json!({
            "error": "Username already taken"
        }));
    }

    match insert_user(&username, password, pool.get_ref()).await {
        Ok(_) => HttpResponse::Created().json(json!({
            "message": "User registered successfully"
        })),
        Err(err_resp) => err_resp,
    }
}

/// Issues a token pair and records the refresh token's `jti`.
async fn issue_token_pair(
    user_id: i64,
    username: &str,
    role: Role,
    pool: &SqlitePool,
    config: &Config,
) -> Result<LoginResponse, HttpResponse> {
    let access_token = generate_access_token(
        user_id,
        username.to_string(),
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to sign access token");
        HttpResponse::InternalServerError().finish()
    })?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        username.to_string(),
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to sign refresh token");
        HttpResponse::InternalServerError().finish()
    })?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        HttpResponse::InternalServerError().finish()
    })?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
        role,
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = LoginResponse),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    // 1️⃣ Basic validation
    let username = normalize_username(&user.username);
    if username.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return HttpResponse::BadRequest().body("Username or password required");
    }

    // 2️⃣ Fetch user
    let db_user = match sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, role, created_at, last_login_at
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(&username)
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(user)) => {
            debug!(user_id = user.id, "User found");
            user
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // 3️⃣ Verify password
    if let Err(e) = verify_password(&user.password, &db_user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    // 4️⃣ Tokens
    let tokens = match issue_token_pair(
        db_user.id,
        &db_user.username,
        db_user.role,
        pool.get_ref(),
        &config,
    )
    .await
    {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    // 5️⃣ Update last_login_at (non-fatal)
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }
    USERNAMES.touch(&db_user.username).await;

    info!(role = %db_user.role, "Login successful");

    HttpResponse::Ok().json(tokens)
}

/// Identity carried by the access token
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Authenticated user", body = AuthUser),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[get("/me")]
pub async fn me(auth: AuthUser) -> impl Responder {
    HttpResponse::Ok().json(auth)
}

fn bearer_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))?;

    verify_token(token, &config.jwt_secret).ok()
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair", body = LoginResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    let claims = match bearer_claims(&req, &config) {
        Some(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::Unauthorized().finish(),
    };

    // 🔥 revoke the presented token; only one caller can win this update
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = 1
        WHERE jti = ?
        AND user_id = ?
        AND revoked = 0
        "#,
    )
    .bind(&claims.jti)
    .bind(claims.user_id)
    .execute(pool.get_ref())
    .await;

    match revoked {
        Ok(r) if r.rows_affected() == 1 => {}
        Ok(_) => return HttpResponse::Unauthorized().finish(),
        Err(e) => {
            error!(error = %e, "Failed to revoke refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    }

    // 🔄 issue new pair
    match issue_token_pair(claims.user_id, &claims.sub, claims.role, pool.get_ref(), &config).await
    {
        Ok(tokens) => HttpResponse::Ok().json(tokens),
        Err(resp) => resp,
    }
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Refresh token revoked (idempotent)")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    // only refresh tokens can logout
    let claims = match bearer_claims(&req, &config) {
        Some(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    // success even if the token didn't exist
    HttpResponse::NoContent().finish()
}
