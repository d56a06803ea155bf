use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use expo_push::ExpoClient;
use realtime_service::{
    handlers, logging, metrics,
    services::ExpoGateway,
    AppState, Config, MemoryStore, PgStore, Store,
};
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    info!(env = %config.app.env, port = config.app.port, "Starting realtime service");

    let store: Arc<dyn Store> = match &config.database.url {
        Some(url) => {
            let store = PgStore::connect(url, config.database.max_connections)
                .await
                .context("failed to connect to database")?;
            store
                .run_migrations()
                .await
                .context("failed to run migrations")?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store; data will not survive restarts");
            Arc::new(MemoryStore::new())
        }
    };

    let client = ExpoClient::new(
        config.push.push_url.clone(),
        config.push.access_token.clone(),
        config.push.gateway_timeout(),
    )
    .context("failed to build Expo client")?;
    let gateway = Arc::new(ExpoGateway::new(client));

    let state = AppState::new(store, gateway, &config);
    let addr = format!("0.0.0.0:{}", config.app.port);
    info!("Starting HTTP server on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(handlers::health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::configure)
    })
    .bind(&addr)?
    .run()
    .await?;

    Ok(())
}
