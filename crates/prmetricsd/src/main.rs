use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prmetrics_config::{apply_env_overrides, load_config, process_env, resolve, validate_config};
use prmetrics_store::SqliteStore;
use prmetrics_vcs::GitHubProvider;
use prmetricsd::cli::Cli;
use prmetricsd::logging::init_tracing;
use prmetricsd::{AppState, MetricsPipeline, router};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    tracing::info!(log_format = cli.log_format.as_str(), "application starting");

    let file_config = load_config(&cli.config)
        .with_context(|| format!("failed to load config at {}", cli.config.display()))?;
    let mut config = apply_env_overrides(file_config, process_env);
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = cli.db_path {
        config.storage.sqlite_path = db_path;
    }

    let runtime_config =
        resolve(&config, process_env).context("failed to resolve runtime configuration")?;
    for warning in validate_config(&runtime_config) {
        tracing::warn!(code = warning.code, "config warning: {}", warning.message);
    }

    let store = SqliteStore::open(&runtime_config.sqlite_path).with_context(|| {
        format!(
            "failed to open metrics store at {}",
            runtime_config.sqlite_path.display()
        )
    })?;
    let provider =
        GitHubProvider::new(&runtime_config.github).context("failed to build GitHub provider")?;
    tracing::info!(
        repo = provider.repo(),
        branch = provider.default_branch(),
        "GitHub provider ready"
    );

    tracing::info!(path = %store.sqlite_path().display(), "metrics store ready");

    let pipeline = MetricsPipeline::new(Arc::new(store), Arc::new(provider));
    tracing::info!(provider = pipeline.provider_name(), "metrics pipeline ready");
    let app = router(AppState::new(pipeline, runtime_config.secret_header));

    let listener = tokio::net::TcpListener::bind(&runtime_config.bind)
        .await
        .with_context(|| format!("failed to bind {}", runtime_config.bind))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "listening for metric submissions");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server exited with error")?;

    tracing::info!("application finished");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
