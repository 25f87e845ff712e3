//! Binary entrypoint for the chatsync HTTP server.
//!
//! Configuration comes from environment variables; see
//! [`chatsync_server::config`].

use chatsync_server::config::ServerConfig;
use chatsync_server::router::build_router;
use chatsync_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let state = AppState::new(&config)?;
    let app = build_router(state);

    let addr = config.addr();
    tracing::info!("chatsync server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
