use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docforge_backend::{build_router, initialize_app_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docforge_backend=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let bind_address = docforge_backend::app_config::config().bind_address.clone();
    info!("Starting DocForge backend on {}", bind_address);

    let state = match initialize_app_state().await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            return Err(anyhow::anyhow!("initialization failed: {}", e));
        },
    };

    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on {}", bind_address);

    axum::serve(listener, router).await?;

    Ok(())
}
