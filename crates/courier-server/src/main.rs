mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_api::assets::{AssetBackend, DiskAssetHost, HttpAssetHost};
use courier_api::routes::{self, AppStateInner};
use courier_api::{ChatListAggregator, IdentityStore, MessageStore, TokenIssuer};
use courier_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier=debug,courier_api=debug,courier_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Profile picture hosting
    let assets = match config.asset_upload_url {
        Some(url) => {
            info!("Uploading profile pictures to {}", url);
            AssetBackend::Remote(HttpAssetHost::new(url))
        }
        None => AssetBackend::Disk(
            DiskAssetHost::new(config.asset_dir.clone(), &config.public_url).await?,
        ),
    };

    let tokens = TokenIssuer::new(
        &config.jwt_secret,
        chrono::Duration::hours(config.token_ttl_hours),
    );

    let state = Arc::new(AppStateInner {
        identity: IdentityStore::new(db.clone(), Arc::new(assets), tokens),
        messages: MessageStore::new(db.clone()),
        chat_list: ChatListAggregator::new(db),
    });

    let app = Router::new()
        .merge(routes::router(state))
        .nest_service("/assets", ServeDir::new(&config.asset_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Courier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
