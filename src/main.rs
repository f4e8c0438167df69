//! Ordering bot
//!
//! A conversational ordering engine over a messaging transport: customers
//! browse a service catalog by number, confirm an order and keep talking to
//! the operator in the order's thread.

mod api;
mod catalog;
mod config;
mod connection;
mod db;
mod finalizer;
mod notify;
mod router;
mod runtime;
mod session;
mod state_machine;

use api::{create_router, AppState};
use catalog::{CatalogNode, CatalogResolver};
use config::AppConfig;
use connection::{ConnectionError, ConnectionManager, ConnectionStatus, CredentialStore, DisconnectReason, GatewayTransport};
use db::Database;
use finalizer::OrderFinalizer;
use notify::{LogNotifier, SmsNotifier};
use router::CommandRouter;
use runtime::{ConversationDispatcher, DatabaseStorage, NotificationSink};
use session::SessionStore;
use state_machine::EngineContext;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const INBOUND_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ordering_bot=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    if let Some(seed) = &config.catalog_seed {
        seed_catalog(&db, seed).await?;
    }

    // Conversation engine
    let storage = Arc::new(DatabaseStorage::new(db.clone()));
    let catalog = CatalogResolver::new(storage.clone());
    let notifier: Arc<dyn NotificationSink> = match config.sms.clone() {
        Some(settings) => {
            tracing::info!(url = %settings.url, "Order notifications go out by SMS");
            Arc::new(SmsNotifier::new(settings)?)
        }
        None => {
            tracing::warn!("No SMS gateway configured. Set BOT_SMS_URL to get order notifications.");
            Arc::new(LogNotifier)
        }
    };
    let finalizer = OrderFinalizer::new(catalog.clone(), storage.clone(), notifier, config.currency_symbol.clone());
    let ctx = Arc::new(EngineContext {
        catalog,
        orders: storage.clone(),
        help: storage,
        finalizer,
        currency: config.currency_symbol.clone(),
    });
    let sessions = Arc::new(SessionStore::new());
    let router = CommandRouter::new(ctx, sessions.clone());

    // Transport
    let transport = Arc::new(GatewayTransport::new(&config.gateway_url)?);
    let transport_events = transport.event_sink();
    let connection = Arc::new(ConnectionManager::new(
        transport,
        CredentialStore::new(&config.auth_dir),
        config.connection.clone(),
    ));

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let dispatcher = Arc::new(ConversationDispatcher::new(router, connection.clone()));
    tokio::spawn(connection.clone().run(inbound_tx));
    tokio::spawn(dispatcher.run(inbound_rx));

    if let Err(e) = connection.bootstrap().await {
        tracing::error!(error = %e, "Initial connection failed");
        let reason = match e {
            ConnectionError::Transport(e) if e.is_terminal() => DisconnectReason::LoggedOut,
            e => DisconnectReason::transient(e.to_string()),
        };
        connection.on_transport_closed(reason).await;
    }

    let state = AppState::new(connection.clone(), db, sessions, transport_events);
    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Operator bridge listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(fatal_connection(connection.subscribe()))
        .await?;

    if connection.status().fatal {
        return Err("messaging connection could not be re-established".into());
    }
    Ok(())
}

async fn seed_catalog(db: &Database, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = tokio::fs::read_to_string(path).await?;
    let nodes: Vec<CatalogNode> = serde_json::from_str(&text)?;
    let inserted = db.seed_catalog(&nodes)?;
    tracing::info!(path = %path.display(), total = nodes.len(), inserted, "Catalog seeded");
    Ok(())
}

/// Resolves once the reconnect budget is spent
async fn fatal_connection(mut status: watch::Receiver<ConnectionStatus>) {
    loop {
        let fatal = status.borrow_and_update().fatal;
        if fatal {
            tracing::error!("Reconnect attempts exhausted, shutting down");
            return;
        }
        if status.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
