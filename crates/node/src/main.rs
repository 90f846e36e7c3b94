use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use clap::Parser;
use tokio::sync::mpsc;

use solidus_crypto::SignerIdentity;
use solidus_ledger::{build_genesis, ChainParams, GenesisConfig};
use solidus_node::consensus::{ConsensusLoop, NoOutbound};
use solidus_node::status::{StatusHandle, StatusSnapshot};
use solidus_node::store::{BlockStore, MemoryStore};
use solidus_node::{FrozenChain, NodeCfg};

#[derive(Parser, Debug)]
#[command(name = "solidus-node", about = "Solidus blockchain verifier")]
struct Args {
    /// Path to a genesis config JSON; used only when the store is empty.
    #[arg(long)]
    genesis: Option<PathBuf>,

    /// Hex-encoded 32-byte signing seed; a random identity is generated when
    /// absent.
    #[arg(long)]
    seed: Option<String>,

    /// Status endpoint listen address.
    #[arg(long, default_value = "127.0.0.1:8642")]
    listen: SocketAddr,

    /// Data directory for the block store (requires the persistence feature).
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn parse_seed(hex_seed: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_seed).context("seed is not valid hex")?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("seed must be exactly 32 bytes"))?;
    Ok(arr)
}

fn open_store(args: &Args) -> anyhow::Result<Box<dyn BlockStore>> {
    match &args.data_dir {
        None => Ok(Box::new(MemoryStore::new())),
        #[cfg(feature = "persistence")]
        Some(dir) => {
            let store = solidus_node::store::RocksStore::open(dir)
                .context("opening block store")?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "persistence"))]
        Some(_) => {
            anyhow::bail!("--data-dir requires building with the persistence feature")
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn status_handler(State(status): State<StatusHandle>) -> Json<StatusSnapshot> {
    Json(status.read())
}

#[cfg(feature = "metrics")]
async fn metrics_handler() -> String {
    use prometheus::Encoder;
    let mut buf = Vec::new();
    let encoder = prometheus::TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let identity = match &args.seed {
        Some(s) => SignerIdentity::from_seed(parse_seed(s)?),
        None => SignerIdentity::generate(),
    };
    log::info!("verifier identity {}", hex::encode(identity.identifier()));

    let store = open_store(&args)?;
    let mut chain = FrozenChain::open(store, ChainParams::default())
        .map_err(|e| anyhow::anyhow!("opening frozen chain: {e}"))?;

    // Fresh store plus a genesis config: mint the chain.
    if chain.frozen_height().is_none() {
        let Some(path) = &args.genesis else {
            anyhow::bail!("store is empty and no --genesis config was given");
        };
        let raw = std::fs::read_to_string(path).context("reading genesis config")?;
        let config: GenesisConfig =
            serde_json::from_str(&raw).context("parsing genesis config")?;
        let (block, snapshot) = build_genesis(&config, &identity);
        chain
            .freeze_genesis(block, snapshot)
            .map_err(|e| anyhow::anyhow!("freezing genesis: {e}"))?;
        log::info!("genesis created from {}", path.display());
    }

    let cfg = NodeCfg::default();
    let (tx, rx) = mpsc::channel(cfg.channel_capacity);
    // The inbound sender is where a wire layer plugs in; the core only sees
    // validated messages.
    let _inbound = tx;

    let consensus = ConsensusLoop::new(chain, identity, Box::new(NoOutbound), cfg);
    let status = consensus.status_handle();
    let shutdown = consensus.shutdown_flag();

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler));
    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));
    let app = app.with_state(status);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .context("binding status endpoint")?;
    log::info!("status endpoint on {}", args.listen);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("status endpoint failed: {e}");
        }
    });

    let loop_task = tokio::spawn(consensus.run(rx));

    tokio::signal::ctrl_c().await.ok();
    log::info!("shutdown requested");
    shutdown.store(true, Ordering::Relaxed);
    loop_task.await.ok();
    Ok(())
}
