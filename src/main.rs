use meridian::api::{self, AppState};
use meridian::completion::CompletionClient;
use meridian::config::Config;
use meridian::service::Conversations;
use meridian::store::Store;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file before reading any configuration
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = dotenv_result {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    info!("Meridian daemon starting...");

    let config = Config::from_env()?;

    info!("Initializing store at {}", config.database_path.display());
    let store = Store::open(&config.database_path).await?;

    let conversations = Conversations::new(store);
    let completions = CompletionClient::new(&config.completion)?;

    let app = api::router(AppState {
        conversations,
        completions,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Listening on port {}", config.port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
