use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comfygate_api::config::ServerConfig;
use comfygate_api::router::build_app_router;
use comfygate_api::state::AppState;
use comfygate_comfyui::generator::ComfyUIGenerator;
use comfygate_core::workflow::WorkflowTemplate;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "comfygate_api=debug,comfygate_comfyui=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    if config.password_generated {
        tracing::warn!(
            username = %config.credentials.username(),
            password = %config.credentials.password(),
            "No PASSWORD set, generated one for this run"
        );
    }

    // --- Workflow template ---
    let workflow = match WorkflowTemplate::load(&config.workflow_path, &config.node_targets) {
        Ok(workflow) => workflow,
        Err(e) => {
            tracing::error!(
                path = %config.workflow_path.display(),
                error = %e,
                "Failed to load workflow template"
            );
            std::process::exit(1);
        }
    };
    tracing::info!(path = %config.workflow_path.display(), "Workflow template loaded");

    // --- ComfyUI generator ---
    let generator = ComfyUIGenerator::new(config.generator_config())
        .expect("Failed to build ComfyUI HTTP client");
    tracing::info!(url = %config.comfyui.url, "ComfyUI generator ready");

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        workflow: Arc::new(workflow),
        backend: Arc::new(generator),
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // In-flight generations observe this and dequeue their prompts.
            signal_token.cancel();
        })
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
