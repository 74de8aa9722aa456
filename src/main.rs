use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};

mod access;
mod api;
mod attendance;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod state;
mod store;
mod utils;


use config::Config;
use db::init_db;
use state::AppState;
use store::{MemoryStore, MySqlStore, Store};
use utils::notifier::LogNotifier;

use crate::docs::ApiDoc;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

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
        .with_target(true) // keeps the `notify` target visible
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(MySqlStore::new(init_db(url).await?)),
        None => {
            warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, Arc::new(LogNotifier), &config);
    state
        .bootstrap(&config)
        .await
        .map_err(|e| anyhow::anyhow!("bootstrap failed: {}", e))?;

    state
        .reconciler
        .clone()
        .spawn_schedule(Duration::from_secs(config.reconcile_interval_secs.max(1)));

    let limiters = routes::RateLimiters::new(&config)?;
    let server_addr = config.server_addr.clone();
    let state = Data::new(state);
    let config_data = Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} matches JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(state.clone())
            .app_data(config_data.clone())
            .configure(|cfg| routes::configure(cfg, &config_data, &limiters))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
