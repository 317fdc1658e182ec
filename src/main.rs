use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;

mod ai;
mod api;
mod auth;
mod config;
mod db;
mod docs;
mod document;
mod model;
mod models;
mod routes;
mod utils;

#[cfg(test)]
mod test_support;

use crate::ai::reason_check::{ReasonChecker, ReasonCheckerConfig};
use crate::docs::ApiDoc;
use crate::utils::username_registry::USERNAMES;
use config::Config;
use db::init_db;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Campus leave service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.db_max_connections).await?;

    if config.seed_demo_users {
        db::seed_demo_users(&pool).await?;
    }

    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("cannot create upload dir {}", config.upload_dir))?;

    let checker = Data::new(
        ReasonChecker::new(ReasonCheckerConfig::from(&config))
            .context("failed to build reason checker")?,
    );

    let pool_for_warmup = pool.clone();
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    actix_web::rt::spawn(async move {
        // every username into the filter, the last 30 days of logins into the cache
        if let Err(e) = USERNAMES.warmup(&pool_for_warmup, 30).await {
            warn!(error = ?e, "Failed to warm up username registry");
        }
    });

    info!(addr = %server_addr, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(checker.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("cannot bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
