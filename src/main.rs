use std::env;
use std::sync::Arc;

use aide::axum::ApiRouter;
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geoingest::api::dispatcher::{self, AppState};
use geoingest::config::Config;
use geoingest::db::pool::Database;
use geoingest::openapi;
use geoingest::storage::S3Storage;
use geoingest::worker::runtime::WorkerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "geoingest=debug,tower_http=debug,axum::rejection=trace".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    let worker_mode = args.iter().any(|arg| arg == "--worker" || arg == "-w");

    let config = Config::load()?;

    let db = Database::connect(&config.database).await?;
    tracing::info!("Connected to database");

    db.run_migrations().await?;
    tracing::info!("Migrations complete");

    let storage = S3Storage::new(&config.s3)?;
    storage.ensure_bucket().await?;
    tracing::info!("Object storage reachable");

    if worker_mode {
        tracing::info!("Starting geoingest in worker mode");
        let runtime = WorkerRuntime::new(db, storage, config.worker.clone());
        runtime.run().await?;
    } else {
        tracing::info!("Starting geoingest on {}:{}", config.host, config.port);

        let app = build_router(config.clone(), db, storage);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", addr);

        axum::serve(listener, app).await?;
    }

    Ok(())
}

fn build_router(config: Arc<Config>, db: Database, storage: S3Storage) -> Router {
    let mut openapi_spec = openapi::create_openapi(&config);

    let state = AppState {
        db: Arc::new(db),
        storage: Arc::new(storage),
        config: config.clone(),
    };

    let api_router: ApiRouter<AppState> = ApiRouter::new()
        .merge(dispatcher::routes())
        .merge(openapi::docs_routes::<AppState>())
        .finish_api(&mut openapi_spec)
        .with_state(state);

    let openapi_spec = Arc::new(openapi_spec);

    Router::from(api_router)
        .layer(Extension(config))
        .layer(Extension(openapi_spec))
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
