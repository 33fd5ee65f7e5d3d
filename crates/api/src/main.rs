//! Salon support chat relay server

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use salonchat_api::{config::StoreBackend, routes::create_router, AppState, Config};
use salonchat_shared::{create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_json);

    let pool = match (config.store_backend, config.database_url.as_deref()) {
        (StoreBackend::Postgres, Some(url)) => {
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            Some(pool)
        }
        (StoreBackend::Postgres, None) => anyhow::bail!("DATABASE_URL is required for the postgres store"),
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using in-memory conversation store; data is lost on restart");
            None
        }
    };

    let bind_address = config.bind_address.clone();
    let enforce = config.enforce_room_access;
    let state = AppState::new(config, pool)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    tracing::info!(
        address = %bind_address,
        enforce_room_access = enforce,
        "Support relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("salonchat_api=debug,salonchat_shared=info,tower_http=debug"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
