//! AURIGA - predictive vehicle-maintenance pipeline
//!
//! Single-binary runtime: in-process bus, sled document store, stage
//! workers, orchestrator, and the HTTP surface (telemetry ingest +
//! telephony webhook).
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (simulated telephony, ./auriga-data store)
//! cargo run --release
//!
//! # Point at a real model gateway and bind elsewhere
//! MODEL_GATEWAY_URL=http://gateway:8600/generate \
//! cargo run --release -- --addr 0.0.0.0:9000
//! ```
//!
//! # Environment Variables
//!
//! - `AURIGA_CONFIG`: path to a TOML config file
//! - `PROJECT_ID`, `REGION`: backend addressing
//! - `CONFIDENCE_THRESHOLD`, `DUPLICATE_WINDOW_SECS`: substrate tunables
//! - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_CALLER_NUMBER`,
//!   `TWILIO_WEBHOOK_BASE_URL`: telephony provider credentials
//! - `RUST_LOG`: logging level (default: info)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use auriga::agents::worker::StageContext;
use auriga::api::{self, ApiState};
use auriga::bus::InProcessBus;
use auriga::config::PipelineConfig;
use auriga::model::gateway::GatewayBackend;
use auriga::pipeline::spawn_pipeline;
use auriga::store::warehouse::{JsonlWarehouse, NullWarehouse, WarehouseSink};
use auriga::store::DocumentStore;
use auriga::telephony::webhook::WebhookState;
use auriga::telephony::{HttpTelephonyProvider, SimulatedProvider, TelephonyProvider};

#[derive(Parser, Debug)]
#[command(name = "auriga", about = "Predictive vehicle-maintenance pipeline")]
struct Args {
    /// Bind address for the HTTP server (overrides config)
    #[arg(long)]
    addr: Option<String>,

    /// Document store path (overrides config)
    #[arg(long)]
    store_path: Option<std::path::PathBuf>,

    /// Use the simulated telephony provider even when credentials exist
    #[arg(long)]
    simulate_telephony: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = PipelineConfig::load();
    if let Some(addr) = args.addr {
        config.http_addr = addr;
    }
    if let Some(path) = args.store_path {
        config.store_path = path;
    }
    let config = Arc::new(config);
    info!(
        project_id = %config.project_id,
        region = %config.region,
        addr = %config.http_addr,
        "Starting pipeline"
    );

    let store = DocumentStore::open(&config.store_path)
        .with_context(|| format!("opening document store at {}", config.store_path.display()))?;
    let bus = Arc::new(InProcessBus::new());
    let warehouse: Arc<dyn WarehouseSink> = match &config.warehouse_path {
        Some(dir) => Arc::new(JsonlWarehouse::new(dir.clone())),
        None => Arc::new(NullWarehouse),
    };
    let model = Arc::new(GatewayBackend::new(config.model_gateway_url.clone()));

    let telephony_configured =
        !config.telephony.account_sid.is_empty() && !config.telephony.auth_token.is_empty();
    let provider: Arc<dyn TelephonyProvider> = if telephony_configured && !args.simulate_telephony {
        Arc::new(HttpTelephonyProvider::new(
            config.telephony.account_sid.clone(),
            config.telephony.auth_token.clone(),
        ))
    } else {
        info!("Telephony provider not configured, using simulation");
        Arc::new(SimulatedProvider::new())
    };

    let ctx = StageContext {
        store: store.clone(),
        bus: bus.clone(),
        model,
        warehouse,
        config: config.clone(),
    };

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    spawn_pipeline(&ctx, provider, &mut tasks, &cancel);

    let app = api::router(
        Arc::new(ApiState {
            store: store.clone(),
            bus: bus.clone(),
        }),
        Arc::new(WebhookState {
            store,
            bus,
            base_url: config.telephony.webhook_base_url.clone(),
        }),
    );
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("binding {}", config.http_addr))?;
    info!(addr = %config.http_addr, "HTTP server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("HTTP server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    cancel.cancel();
    while tasks.join_next().await.is_some() {}
    info!("Pipeline stopped");
    Ok(())
}
