//! artfetch-svc - Artwork Acquisition Service
//!
//! Augments a media library with artwork from external metadata providers:
//! scans for missing or upgradable artwork, queues the work durably, and
//! resolves it through review or unattended auto-apply.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use artfetch_common::config::{self, TomlConfig};
use artfetch_common::events::EventBus;
use artfetch_svc::library::RpcMediaLibrary;
use artfetch_svc::services::{FanartTvClient, LanguagePolicy, SourceFetcher, TmdbClient};
use artfetch_svc::AppState;

#[derive(Parser, Debug)]
#[command(name = "artfetch-svc", version, about = "Artwork acquisition service")]
struct Args {
    /// Root folder holding the database and config
    #[arg(long)]
    root: Option<String>,

    /// Bind address for the HTTP API
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root.as_deref(), artfetch_svc::config::ROOT_ENV);
    let toml_config = TomlConfig::load(&config::default_config_path())
        .unwrap_or_else(|e| {
            eprintln!("Warning: failed to load config file: {}", e);
            TomlConfig::default()
        });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(toml_config.logging.filter.clone())),
        )
        .init();

    tracing::info!("Starting artfetch-svc (Artwork Acquisition)");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Root folder: {}", root_folder.display());

    let db_path = config::ensure_root_folder(&root_folder)?;
    tracing::info!("Database: {}", db_path.display());

    let db_pool = artfetch_svc::db::init_database_pool(&db_path).await?;

    // Sessions left active by a previous run will never progress; park them
    // as paused so they stay resumable.
    let orphaned = artfetch_svc::db::sessions::pause_orphaned_sessions(&db_pool).await?;
    if orphaned > 0 {
        tracing::info!(orphaned, "Paused sessions from a previous run");
    }
    artfetch_svc::db::queue::cleanup_old_entries(&db_pool, 30).await?;
    let expired = artfetch_svc::db::cache::clear_expired(&db_pool).await?;
    if expired > 0 {
        tracing::info!(expired, "Cleared expired provider cache entries");
    }

    let preferred_language = artfetch_svc::db::settings::preferred_language(&db_pool).await?;
    let prefer_fanart_language =
        artfetch_svc::db::settings::prefer_fanart_language(&db_pool).await?;
    let policy = LanguagePolicy::new(&preferred_language, prefer_fanart_language);

    let tmdb_key = artfetch_svc::config::resolve_tmdb_api_key(&db_pool, &toml_config).await?;
    let fanart_key = artfetch_svc::config::resolve_fanarttv_api_key(&db_pool, &toml_config).await?;

    let library_endpoint = toml_config
        .library_endpoint
        .clone()
        .unwrap_or_else(|| artfetch_svc::config::DEFAULT_LIBRARY_ENDPOINT.to_string());
    tracing::info!("Library endpoint: {}", library_endpoint);
    let library = Arc::new(RpcMediaLibrary::new(library_endpoint)?);

    let tmdb = tmdb_key.map(|key| TmdbClient::new(key, preferred_language.clone()));
    let fanart = FanartTvClient::new(fanart_key);
    let source = Arc::new(SourceFetcher::new(
        db_pool.clone(),
        library.clone(),
        tmdb,
        fanart,
        policy.clone(),
    ));

    let event_bus = EventBus::new(100);
    let state = AppState::new(db_pool, event_bus, library, source, policy);
    let app = artfetch_svc::build_router(state);

    let bind = args
        .bind
        .unwrap_or_else(|| artfetch_svc::config::DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Listening on http://{}", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
