use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;

use jibber::config::{Cli, Settings};
use jibber::output::create_output;
use jibber::server::{create_app, AppState};
use jibber::shutdown::shutdown_signal;
use jibber::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::load(&cli)?;

    // Initialize tracing
    init_tracing(&settings.log);
    tracing::info!(
        output = ?settings.output.kind,
        templates = %settings.templates.dir.display(),
        "Configuration loaded"
    );

    // Create the output; a persistent client connects here
    let output = create_output(&settings.output).await?;

    // Create application state
    let state = AppState::new(&settings, output.clone());

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    output.close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
