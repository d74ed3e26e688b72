use std::sync::Arc;
use std::time::Duration;

use fitcoach::config::AppConfig;
use fitcoach::llm::{create_provider, LlmBackend, LlmConfig, LlmProvider};
use fitcoach::server::{build_router, AppState};
use fitcoach::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut config = AppConfig::default();
    if let Ok(addr) = std::env::var("FITCOACH_BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(path) = std::env::var("FITCOACH_DB_PATH") {
        config.db_path = path;
    }
    if let Ok(seconds) = std::env::var("FITCOACH_LLM_TIMEOUT_SECS") {
        if let Ok(seconds) = seconds.parse() {
            config.llm_timeout = Duration::from_secs(seconds);
        }
    }

    let model = std::env::var("FITCOACH_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    // The scripted backend exists for offline runs and CI smoke tests.
    let backend = match std::env::var("FITCOACH_LLM_BACKEND").as_deref() {
        Ok("scripted") => LlmBackend::Scripted,
        _ => LlmBackend::Anthropic,
    };
    let api_key = match backend {
        LlmBackend::Anthropic => std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
            eprintln!("Error: ANTHROPIC_API_KEY not set");
            eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
            std::process::exit(1);
        }),
        LlmBackend::Scripted => String::new(),
    };

    let llm = create_provider(&LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
        timeout: config.llm_timeout,
    })?;

    let db_path = std::path::Path::new(&config.db_path);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(db_path).await?);

    tracing::info!(
        bind = %config.bind_addr,
        db = %config.db_path,
        model = llm.model_name(),
        "FitCoach v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let state = AppState {
        db,
        llm,
        config: Arc::new(config.clone()),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl+C received, shutting down...");
        })
        .await?;

    Ok(())
}
