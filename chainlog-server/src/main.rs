use chainlog_server::api;
use chainlog_server::config::Config;
use chainlog_server::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chainlog_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting chainlog-server (env: {})", config.environment);

    let http_port = config.http_port;
    let state = AppState::new(config)?;
    state.start_background_tasks();

    let app = api::create_router(state);

    let addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("chainlog-server listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
