use std::sync::Arc;

use wxgate::config::{AuthMode, GatewayConfig};
use wxgate::dispatch::{DispatchConfig, Dispatcher};
use wxgate::server::{AppState, router};
use wxgate::workers::{CommandLauncher, DisabledLauncher, WorkerLauncher, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = GatewayConfig::from_env()?;

    eprintln!("📮 wxgate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Callback: http://0.0.0.0:{}/weixin", config.port);
    eprintln!(
        "   Auth: {}",
        match config.auth_mode {
            AuthMode::Strict => "strict",
            AuthMode::Relaxed => "relaxed (signature failures are only logged)",
        }
    );

    // ── Worker Pool ─────────────────────────────────────────────────────
    let launcher: Arc<dyn WorkerLauncher> = match config
        .workers
        .command
        .as_deref()
        .and_then(CommandLauncher::from_template)
    {
        Some(launcher) => Arc::new(launcher),
        None => {
            tracing::warn!("WXGATE_WORKER_COMMAND not set, worker activation will fail");
            Arc::new(DisabledLauncher)
        }
    };
    let pool = WorkerPool::new(launcher);
    for i in 0..config.workers.count {
        let port = u16::try_from(i)
            .ok()
            .and_then(|offset| config.workers.base_port.checked_add(offset))
            .ok_or_else(|| anyhow::anyhow!("worker port range exceeds 65535"))?;
        pool.register_generated(port, config.workers.password_len).await;
    }
    eprintln!(
        "   Workers: {} registered from port {}{}",
        pool.len().await,
        config.workers.base_port,
        if config.workers.command.is_some() { "" } else { " (launch disabled)" }
    );

    // ── Dispatcher ──────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(
        DispatchConfig {
            greeting: config.greeting.clone(),
            credentials_key: config.credentials_key.clone(),
        },
        Arc::new(pool),
    );

    let app = router(AppState {
        token: config.token.clone(),
        auth_mode: config.auth_mode,
        dispatcher: Arc::new(dispatcher),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Callback server started");
    axum::serve(listener, app).await?;

    Ok(())
}
