use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use playgroup_api::{
    api::{create_router, AppState},
    config::Config,
    services::{profiles, InMemoryProfileStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("playgroup_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let roster = match config.profiles_path.as_deref() {
        Some(path) => profiles::load_profiles_file(path)?,
        None => {
            tracing::warn!("PROFILES_PATH not set, seeding the sample roster");
            profiles::sample_roster()
        }
    };
    tracing::info!(children = roster.len(), "Profile store seeded");

    // Initialize application state
    let store = Arc::new(InMemoryProfileStore::from_profiles(roster));
    let state = AppState::new(store, &config);

    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        address = %address,
        cache_capacity = config.neighbor_cache_capacity,
        "Server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
