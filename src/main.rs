mod chat;
mod commitment;
mod config;
mod crypto;
mod error;
mod routes;
mod scheduler;
mod storage;
mod submission;
mod vault;
mod verify;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::routes::AppState;
use crate::storage::Storage;
use crate::vault::Vault;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "obelysk_core=info,tower_http=info".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[obelysk-core] configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        pow_difficulty = config.pow_difficulty,
        key_expiry_minutes = config.key_expiry_minutes,
        sweep_interval_secs = config.sweep_interval_secs,
        "starting obelysk-core"
    );

    let vault = Vault::open(&config.vault_dir)
        .await
        .expect("failed to open vault");
    let storage = Arc::new(
        Storage::open(&config.data_dir, &config.vault_dir)
            .await
            .expect("failed to open storage"),
    );

    scheduler::spawn(storage.clone(), config.sweep_interval_secs);

    let state = Arc::new(AppState {
        storage,
        vault,
        config: config.clone(),
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid listen address");

    info!(addr = %addr, "obelysk-core listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    info!("obelysk-core shut down");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/identity", axum::routing::post(routes::identity))
        .route("/auth/submit", axum::routing::post(routes::submit))
        .route(
            "/auth/read/{msg_id}",
            axum::routing::get(routes::read_submission),
        )
        .route("/chat/send", axum::routing::post(routes::chat_send))
        .route(
            "/chat/inbox/{user_id}",
            axum::routing::get(routes::chat_inbox),
        )
        .route("/keys/register", axum::routing::post(routes::register_key))
        .route("/keys/server/pubkey", axum::routing::get(routes::server_pubkey))
        .route("/keys/{user_id}", axum::routing::get(routes::get_key))
        .route("/verify/root", axum::routing::get(routes::verify_root))
        .route("/verify/hash", axum::routing::post(routes::verify_hash))
        .route("/verify/proof/{id}", axum::routing::get(routes::verify_proof))
        .route(
            "/verify/signature",
            axum::routing::post(routes::verify_signature),
        )
        .route("/admin/status", axum::routing::get(routes::admin_status))
        .route("/admin/expire", axum::routing::post(routes::admin_expire))
        .route("/health", axum::routing::get(routes::health))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            "Referrer-Policy".parse::<header::HeaderName>().unwrap(),
            HeaderValue::from_static("no-referrer"),
        ))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
