//! raftkv - a replicated key-value store on Raft consensus.
//!
//! A fixed-size cluster of peer nodes cooperates so that writes directed
//! at the leader are durably ordered, replicated to a majority, and then
//! applied to an identical in-memory map on every replica. Reads are
//! served from the local applied state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        raftkv node                       │
//! ├──────────────────────────────────────────────────────────┤
//! │  Transport: peer + client listeners | outbound senders   │
//! ├──────────────────────────────────────────────────────────┤
//! │  Inbound queue (mpsc, single consumer)                   │
//! ├──────────────────────────────────────────────────────────┤
//! │  Consensus core: roles | elections | replication | commit│
//! ├──────────────────────────────────────────────────────────┤
//! │  State machine: key-value map  |  Durable state blob     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything that is not the consensus core (listeners, per-connection
//! handlers, outbound senders, timers) communicates with it exclusively
//! by enqueueing commands, so all Raft state has a single writer and no
//! locks.
//!
//! # Quick Start
//!
//! ```no_run
//! use raftkv::config::NodeConfig;
//!
//! #[tokio::main]
//! async fn main() -> raftkv::Result<()> {
//!     let config = NodeConfig::development();
//!     raftkv::run(config).await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod kv;
pub mod net;
pub mod raft;
pub mod types;

pub use error::{KvError, Result};

use config::NodeConfig;
use raft::{NodeStatus, RaftCommand, RaftConfig, RaftNode, RaftStorage};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// A running raftkv node: consensus core plus its listeners and workers.
pub struct Server {
    config: NodeConfig,
    inbound: mpsc::UnboundedSender<RaftCommand>,
    shutdown: watch::Sender<bool>,
    core: JoinHandle<Result<()>>,
}

impl Server {
    /// Bind both endpoints, reload durable state, and start serving.
    ///
    /// Fails fast on an unbindable endpoint or unreadable non-empty
    /// storage; those are the unrecoverable init errors.
    pub async fn start(config: NodeConfig) -> Result<Server> {
        config.validate()?;

        let peer_listener = TcpListener::bind(&config.peer_endpoint)
            .await
            .map_err(|e| {
                KvError::Network(format!("failed to bind {}: {}", config.peer_endpoint, e))
            })?;
        let client_listener = TcpListener::bind(&config.client_endpoint)
            .await
            .map_err(|e| {
                KvError::Network(format!("failed to bind {}: {}", config.client_endpoint, e))
            })?;

        let storage = RaftStorage::open(&config.storage_path)?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let node = RaftNode::new(
            RaftConfig::from(&config),
            storage,
            inbound_tx.clone(),
            outbound_tx,
        )?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(net::server::serve_peers(
            peer_listener,
            inbound_tx.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(net::server::serve_clients(
            client_listener,
            inbound_tx.clone(),
            shutdown_rx,
        ));
        tokio::spawn(net::peer::run_outbound(
            outbound_rx,
            config.peer_addrs(),
            inbound_tx.clone(),
        ));

        let core = tokio::spawn(node.run(inbound_rx));

        info!(
            node_id = config.id,
            peer_endpoint = %config.peer_endpoint,
            client_endpoint = %config.client_endpoint,
            "server started"
        );

        Ok(Server {
            config,
            inbound: inbound_tx,
            shutdown: shutdown_tx,
            core,
        })
    }

    /// Queue handle for in-process callers (tests, embedding).
    pub fn command_sender(&self) -> mpsc::UnboundedSender<RaftCommand> {
        self.inbound.clone()
    }

    /// This node's client endpoint.
    pub fn client_addr(&self) -> &str {
        &self.config.client_endpoint
    }

    /// Snapshot of the core's state.
    pub async fn status(&self) -> Result<NodeStatus> {
        let (tx, rx) = oneshot::channel();
        self.inbound
            .send(RaftCommand::Status { reply: tx })
            .map_err(|_| KvError::Shutdown)?;
        rx.await.map_err(|_| KvError::Shutdown)
    }

    /// Stop the node and wait for the core to drain.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let _ = self.inbound.send(RaftCommand::Shutdown);
        self.core
            .await
            .map_err(|e| KvError::Internal(format!("consensus task failed: {}", e)))?
    }
}

/// Run a node until ctrl-c.
pub async fn run(config: NodeConfig) -> Result<()> {
    let server = Server::start(config).await?;
    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");
    server.stop().await
}
