use std::sync::Arc;

use tracing::info;

use msgbridge_backend::DifyConversationBackend;
use msgbridge_email::SendGridEmailSender;
use msgbridge_gateway::InMemoryWorkQueue;
use msgbridge_identity::KeycloakIdentityStore;
use msgbridge_server::config::AppConfig;
use msgbridge_server::state::AppState;
use msgbridge_server::worker_pool::{self, PoolConcurrency};
use msgbridge_server::{api, audit_factory, state_factory};
use msgbridge_transport::HttpMessagingTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let (store, lock) = state_factory::create_state(&config.backends)?;
    let audit = audit_factory::create_audit_store(&config.backends).await?;

    let identity = Arc::new(KeycloakIdentityStore::new(config.identity.clone()));
    let email = Arc::new(SendGridEmailSender::new(config.email.clone())?);
    let backend = Arc::new(DifyConversationBackend::new(config.backend.clone())?);
    let transport = Arc::new(HttpMessagingTransport::new(config.transport.clone())?);

    let (queue, receivers) = InMemoryWorkQueue::new(1024);
    let queue = Arc::new(queue);

    let state = AppState::new(
        config.gateway.clone(),
        store,
        lock,
        audit,
        identity,
        email,
        backend,
        transport,
        queue,
    );

    worker_pool::spawn(state.worker.clone(), receivers, PoolConcurrency::default());
    spawn_sequence_cleanup(state.sequence.clone());

    let app = api::router(state);

    let addr = format!("{}:{}", config.bind.host, config.bind.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "msgbridge-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("msgbridge-server shut down");
    Ok(())
}

/// Periodically sweep expired registration sequences out of the KV store.
fn spawn_sequence_cleanup(sequence: Arc<msgbridge_gateway::SequenceManager>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            match sequence.cleanup_expired().await {
                Ok(count) if count > 0 => info!(count, "cleaned up expired registration sequences"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "sequence cleanup sweep failed"),
            }
        }
    });
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
