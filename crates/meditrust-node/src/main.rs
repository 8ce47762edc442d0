//! meditrust-node: the MediTrust ledger daemon.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the node
//! via newline-delimited JSON-RPC 2.0 over a Unix socket in the data
//! directory.

mod commands;
mod config;
mod events;
mod rpc;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::{error, info, warn};

use meditrust_engine::{Engine, SystemClock};
use meditrust_types::EventType;

use crate::config::NodeConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// Socket file name inside the data directory.
const SOCKET_FILE_NAME: &str = "node.sock";

/// Per-subscriber event buffer.
const EVENT_BUFFER: usize = 1000;

/// Node-wide shared state.
pub struct NodeState {
    pub engine: Arc<Engine>,
    pub config: NodeConfig,
    pub event_bus: EventBus,
}

impl NodeState {
    pub fn new(engine: Engine, config: NodeConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
            event_bus: EventBus::new(EVENT_BUFFER),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = NodeConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("meditrust={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("MediTrust node starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Open database and restore state
    let db_path = data_dir.join(meditrust_db::DB_FILE_NAME);
    let conn = meditrust_db::open(&db_path)?;
    let engine = Engine::open(
        Arc::new(Mutex::new(conn)),
        config.engine_config(),
        Arc::new(SystemClock),
    )?;

    let refuse_invalid_chain = config.ledger.refuse_invalid_chain;
    let verify_on_startup = config.ledger.verify_on_startup || refuse_invalid_chain;
    let state = Arc::new(NodeState::new(engine, config));

    // 4. Audit the restored chain
    if verify_on_startup {
        let report = state.engine.verify_chain();
        if report.valid {
            info!(blocks = report.total_blocks, "chain verified");
        } else {
            warn!(
                blocks = report.total_blocks,
                first_invalid_index = ?report.first_invalid_index,
                "chain failed verification"
            );
        }
        state
            .event_bus
            .emit(EventType::ChainVerified, serde_json::json!(report));
        if refuse_invalid_chain {
            Engine::check_chain(&report)
                .context("refusing to serve a chain that failed verification")?;
        }
    }

    // 5. Start IPC server
    let socket_path = data_dir.join(SOCKET_FILE_NAME);
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    state.event_bus.emit(
        EventType::NodeStarted,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "approval_policy": state.engine.config().approval_policy,
        }),
    );

    // 6. Run the RPC server until shutdown
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    let _ = std::fs::remove_file(&socket_path);

    info!("Node stopped");
    Ok(())
}
