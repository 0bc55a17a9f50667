mod api;
mod cli;
mod directory;
mod reconciler;
mod room;
mod state;
mod workstation;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use presence_auth::{FileSecretStore, SecretResolver, SecretStore};
use presence_domain::config::Config;
use presence_pathfinding::{build_grid_from_tilemap, validate_precomputed_grid, Grid, TileMap};
use presence_registry_client::RegistryClient;
use presence_store::Store;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use cli::{Cli, Command, ConfigAction};
use directory::RoomDirectory;
use reconciler::Reconciler;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(&cli)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Doctor => cli::run_doctor(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Show => cli::run_config_show(&config),
            ConfigAction::Validate => cli::run_config_validate(&config),
        },
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        tracing::warn!(%issue, "config issue");
    }

    let config = Arc::new(config);

    let store = Arc::new(Store::open(&config.store.db_path())?);
    let registry = Arc::new(RegistryClient::new(
        config.registry.service_url.clone().unwrap_or_default(),
    ));

    let secret_store: Arc<dyn SecretStore> = Arc::new(FileSecretStore::new(config.store.data_dir.join("secrets")));
    let resolver = Arc::new(SecretResolver::new(
        registry.clone(),
        secret_store,
        Duration::from_secs(config.secrets.secret_cache_ttl_secs),
        Duration::from_secs(config.secrets.tenant_secret_cache_ttl_secs),
    ));

    let directory = RoomDirectory::new(store.clone(), registry.clone(), config.registry.base_domain.clone());

    let pathfind_grid = load_pathfind_grid(&config).await;

    let reconciler = Reconciler::new(directory.clone(), registry.clone(), store.clone(), config.registry.clone());
    reconciler.bootstrap().await?;
    reconciler.clone().run_periodic();

    let state = AppState {
        config: config.clone(),
        store,
        registry,
        resolver,
        directory,
        pathfind_grid,
    };

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(4)
            .burst_size(20)
            .finish()
            .expect("static governor config is valid"),
    );

    let app = api::router(state)
        .layer(GovernorLayer {
            config: governor_config,
        })
        .layer(build_cors_layer(&config.server.cors.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr, "presence gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Loads the walkable grid at startup (spec §4.A, §4.I `POST
/// /api/pathfind`): validates a precomputed sidecar against the tile map
/// if both are configured, otherwise rasterises the map directly. Missing
/// configuration just leaves pathfinding unavailable (503 at the endpoint)
/// rather than failing startup.
async fn load_pathfind_grid(config: &Config) -> Option<Arc<Grid>> {
    let map_path = config.pathfinding.tile_map_path.as_ref()?;
    let map_bytes = match tokio::fs::read(map_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, path = %map_path.display(), "failed to read tile map");
            return None;
        }
    };
    let map: TileMap = match serde_json::from_slice(&map_bytes) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, path = %map_path.display(), "failed to parse tile map");
            return None;
        }
    };

    if let Some(sidecar_path) = &config.pathfinding.precomputed_grid_path {
        match tokio::fs::read(sidecar_path).await {
            Ok(sidecar_bytes) => match serde_json::from_slice(&sidecar_bytes) {
                Ok(sidecar) => match validate_precomputed_grid(&sidecar, &map_bytes, &map) {
                    Ok(grid) => return Some(Arc::new(grid)),
                    Err(e) => tracing::warn!(error = %e, "precomputed grid failed validation, rasterising instead"),
                },
                Err(e) => tracing::warn!(error = %e, "failed to parse precomputed grid sidecar"),
            },
            Err(e) => tracing::warn!(error = %e, path = %sidecar_path.display(), "failed to read precomputed grid sidecar"),
        }
    }

    Some(Arc::new(build_grid_from_tilemap(&map)))
}

/// Builds a CORS layer from the configured origin patterns. Each pattern
/// may end in `*` to match any suffix (e.g. `http://localhost:*` matches
/// any port); an exact pattern matches only that literal origin.
fn build_cors_layer(patterns: &[String]) -> CorsLayer {
    let patterns = patterns.to_vec();
    CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .allow_origin(AllowOrigin::predicate(move |origin, _parts| {
            let Ok(origin) = origin.to_str() else {
                return false;
            };
            patterns.iter().any(|p| match p.strip_suffix('*') {
                Some(prefix) => origin.starts_with(prefix),
                None => origin == p,
            })
        }))
}
