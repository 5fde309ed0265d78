//! Storefront service binary

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::api::{router, AppState};
use storefront::auth::TokenVerifier;
use storefront::bus::{run_status_subscriber, EventPublisher, InlinePublisher, NatsPublisher};
use storefront::config::Config;
use storefront::notify::{HttpMessenger, NotificationDispatcher};
use storefront::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(PgStore::connect(&config.database_url, config.database_max_connections).await.context("connecting to the database")?);
    store.migrate().await.context("running migrations")?;

    let messenger = HttpMessenger::new(&config.messaging_api_url, &config.messaging_api_token, config.messaging_timeout)
        .context("building the messaging client")?;
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), Arc::new(messenger)));

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "NATS unavailable, dispatching notifications in-process");
                None
            }
        },
        None => None,
    };
    let publisher: Arc<dyn EventPublisher> = match nats {
        Some(client) => {
            let subscriber_dispatcher = dispatcher.clone();
            let subscriber_client = client.clone();
            tokio::spawn(async move {
                if let Err(e) = run_status_subscriber(subscriber_client, subscriber_dispatcher).await {
                    error!(error = %e, "Order status subscriber stopped");
                }
            });
            Arc::new(NatsPublisher::new(client))
        }
        None => Arc::new(InlinePublisher::new(dispatcher.clone())),
    };

    let state = AppState::new(store, TokenVerifier::new(&config.jwt_secret), publisher, dispatcher)
        .with_webhook_secret(config.webhook_secret.clone())
        .with_merge_policy(config.cart_merge_policy);

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await.with_context(|| format!("binding {address}"))?;
    info!("Storefront listening on {address}");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown_signal()).await?;
    info!("Storefront shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
