use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let port = std::env::var("FILEWARDEN_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "8080".to_string());
    let root = std::env::var("FILEWARDEN_ROOT").unwrap_or_else(|_| "./data".to_string());
    info!(
        target: "filewarden",
        "FileWarden starting: RUST_LOG='{}', port={}, root='{}'",
        rust_log, port, root
    );

    filewarden::server::run().await
}
