//! HTTP service of the LLM DNA atlas.
//!
//! Serves similarity queries over the signature database produced by the
//! offline `process` build, and runs the verify-to-publish flow for model
//! proposals and votes.
//!
//! # Flow
//! - `POST /submit` validates an intent, stores it as a pending submission and
//!   mails a one-time link
//! - `GET /verify?token=...` consumes the link and applies the intent exactly once
//! - `GET /proposals` lists published proposals by votes
//! - `GET /similar` and `GET /neighbors` rank models by signature distance
//!
//! # Notes
//!
//! ## SQLite
//! Proposals, votes and pending submissions live in one SQLite file. The
//! verification path holds an immediate transaction from lookup to commit, so
//! the token flip and its effect are a single unit: a crash in between leaves
//! the token unconsumed, and two concurrent clicks cannot both apply.
//!
//! ## Signature database
//! Loaded once at startup, from `DNA_DATABASE_URL` when set and otherwise from
//! `DNA_DATABASE_PATH`. Regenerate it with the `process` binary.
//!
//! # Setup
//!
//! Run locally.
//! ```sh
//! RUST_LOG=info cargo run --bin dna
//! ```
//!
//! Rebuild the signature database.
//! ```sh
//! cargo run --bin process -- build --dataset squad_cqa_hs_wg_arc_mmlu
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Error};
use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use tokio::{net::TcpListener, signal::ctrl_c};
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod mailer;
pub mod payloads;
pub mod routes;
pub mod state;
pub mod utils;
pub mod workflow;

use routes::{
    health_handler, neighbors_handler, proposals_handler, similar_handler, submit_handler,
    verify_handler,
};
use state::State;

pub async fn start_server() -> Result<(), Error> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await?;

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

pub fn router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let cors = match state.config.allowed_origin.parse::<HeaderValue>() {
        Ok(origin) if state.config.allowed_origin != "*" => cors.allow_origin(origin),
        _ => cors.allow_origin(Any),
    };

    Router::new()
        .route("/submit", post(submit_handler))
        .route("/verify", get(verify_handler))
        .route("/proposals", get(proposals_handler))
        .route("/similar", get(similar_handler))
        .route("/neighbors", get(neighbors_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
