use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use facebox::config::AppConfig;
use facebox::inference::InferenceContext;
use facebox::server::{AppState, router};

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,axum=info,hyper=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!("event" = "config.invalid", %err);
            std::process::exit(2);
        }
    };
    let addr: SocketAddr = match config.server.addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("event" = "config.invalid", addr = %config.server.addr, %err);
            std::process::exit(2);
        }
    };

    let inference = InferenceContext::new(&config.server.models_dir);
    let state = match AppState::new(config, inference) {
        Ok(state) => state,
        Err(err) => {
            error!("event" = "pipeline.invalid", %err);
            std::process::exit(2);
        }
    };
    let suppression = state.config.pipeline.suppression;
    info!(
        "event" = "pipeline.ready",
        anchors = suppression.anchor_count,
        confidence = suppression.confidence_threshold,
        iou = suppression.iou_threshold,
        mode = %suppression.mode
    );

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("event" = "server.bind_failed", %addr, %err);
            std::process::exit(1);
        }
    };
    info!("listening" = %addr, "event" = "server.start");
    if let Err(err) = axum::serve(listener, router(state)).await {
        error!(%err, "server error");
    }
}
