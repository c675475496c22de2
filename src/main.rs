use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ocp_bastion_helper::{build_router, services::ProcessRunner, AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first: it carries the log filter
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("🚀 Starting OCP bastion helper...");
    info!("✅ Configuration loaded (base dir {})", config.base_dir.display());

    if let Err(e) = config.ensure_directories() {
        eprintln!("❌ Failed to prepare working directories: {:#}", e);
        return Err(e.into());
    }
    info!("✅ Working directories ready");

    match &config.privilege_command {
        Some(program) => info!("🔐 Privileged commands run through '{}'", program),
        None => info!("🔐 Privileged commands run directly"),
    }

    let runner = Arc::new(ProcessRunner::new(
        config.privilege_command.clone(),
        config.log_dir(),
    ));

    let server_address = config.server_address.clone();
    let app_state = match AppState::new(config, runner) {
        Ok(state) => {
            info!("✅ Services initialized");
            state
        }
        Err(e) => {
            eprintln!("❌ Failed to initialize services: {:#}", e);
            return Err(e.into());
        }
    };

    let app = build_router(app_state);

    // Start the server
    let listener = match tokio::net::TcpListener::bind(&server_address).await {
        Ok(listener) => {
            info!("🌐 Server listening on {}", server_address);
            listener
        }
        Err(e) => {
            eprintln!("❌ Failed to bind to {}: {}", server_address, e);
            return Err(e.into());
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("❌ Server error: {}", e);
        return Err(e.into());
    }

    info!("✅ Server stopped gracefully");
    Ok(())
}
