use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod notify;
mod routes;
mod service;
mod state;
mod store;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::notify::{LogTransport, NotificationQueue, NotificationTransport, WebhookTransport};
use crate::state::{AppState, SystemClock};
use crate::store::mysql::MySqlStore;
use crate::utils::center_cache::CachedCenters;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Tutor attendance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Server starting...");

    let policy = config.policy()?;
    let pool = init_db(&config.database_url).await?;
    let store = Arc::new(MySqlStore::new(pool.clone()));

    let centers = Arc::new(CachedCenters::new(
        store.clone(),
        Duration::from_secs(config.center_cache_ttl_secs),
    ));

    let transport: Arc<dyn NotificationTransport> = match &config.notify_webhook_url {
        Some(url) => {
            info!(%url, "Delivering notifications through relay");
            let timeout = Duration::from_millis(config.notify_send_timeout_ms.max(1));
            Arc::new(WebhookTransport::new(url.clone(), timeout)?)
        }
        None => {
            info!("No relay configured, notifications go to the log");
            Arc::new(LogTransport)
        }
    };
    let notifications = NotificationQueue::start(transport, config.queue_settings());

    let state = Data::new(AppState {
        attendance: store.clone(),
        button: store.clone(),
        tutors: store.clone(),
        centers: centers.clone(),
        notifications: notifications.clone(),
        clock: Arc::new(SystemClock),
        policy,
    });

    let pool_for_cache_warmup = pool.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = centers.warmup(&pool_for_cache_warmup, 250).await {
            error!(error = ?e, "Failed to warm up center cache");
        }
    });

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config_data.clone())
            .app_data(state.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    let abandoned = notifications.shutdown().await;
    info!(abandoned, "Server stopped");

    Ok(())
}
