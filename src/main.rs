use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frontier_core::config::AppConfig;
use frontier_core::error::ServiceError;
use frontier_core::schema::{base_schema, SchemaDocument, SchemaRegistry};
use frontier_core::services::{DnsTxtResolver, SmtpMailer};
use frontier_core::store::SystemClock;
use frontier_core::{bootstrap_admins, AppState, Ports};

#[tokio::main]
async fn main() -> ExitCode {
    // fail fast on bad configuration
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            return ExitCode::from(2);
        }
    };

    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "startup failed");
            ExitCode::from(1)
        }
    }
}

async fn run(config: AppConfig) -> Result<(), ServiceError> {
    tracing::info!(service = %config.service_name, "starting authorization core");

    let registry = Arc::new(SchemaRegistry::new(load_schema(&config)?)?);

    let ports = Ports {
        clock: Arc::new(SystemClock),
        mailer: Arc::new(SmtpMailer::new(&config.mailer)?),
        resolver: Arc::new(DnsTxtResolver::new()),
    };
    let state = AppState::build(&config, registry, ports)?;

    bootstrap_admins(&state, &config.bootstrap.admins).await?;

    let reaper = tokio::spawn(state.reaper(&config).run());

    tracing::info!(
        namespaces = state.registry.list_namespaces().len(),
        "authorization core ready"
    );

    shutdown_signal().await;

    reaper.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

fn load_schema(config: &AppConfig) -> Result<SchemaDocument, ServiceError> {
    match &config.schema.path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ServiceError::InvalidArgument(format!("cannot read schema {:?}: {}", path, e))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                ServiceError::Schema(format!("cannot parse schema {:?}: {}", path, e))
            })
        }
        None => Ok(base_schema()),
    }
}

fn init_tracing(config: &AppConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install terminate handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
