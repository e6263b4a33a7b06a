//! # Node Runtime
//!
//! Owns the [`NodeContainer`] and the quorum event loop task.
//!
//! ## Startup Sequence
//!
//! 1. Build the container (store, adapters, quorum manager)
//! 2. Spawn the quorum event loop
//! 3. Feed it the current chain tip
//!
//! ## Shutdown Sequence
//!
//! 1. Raise the manager's interrupt (recovery and populator tasks stop)
//! 2. Wait for the event loop to drain, bounded by a timeout

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use qc_18_llmq::{ChainView, QuorumEvent, QuorumEventLoop};

use crate::container::{NodeConfig, NodeContainer};

/// How long shutdown waits for the event loop.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The running node.
pub struct NodeRuntime {
    container: Arc<NodeContainer>,
    events: Mutex<Option<mpsc::Sender<QuorumEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl NodeRuntime {
    /// Create the runtime; nothing runs until [`start`](Self::start).
    pub fn new(config: NodeConfig) -> Result<Self> {
        info!("Creating Quantum-Chain LLMQ node runtime");
        let container = NodeContainer::new(config).context("Failed to build node container")?;
        Ok(Self {
            container: Arc::new(container),
            events: Mutex::new(None),
            event_loop: Mutex::new(None),
        })
    }

    /// Spawn the event loop and process the current tip.
    pub async fn start(&self) -> Result<()> {
        let config = &self.container.config;
        info!("===========================================");
        info!("  Quantum-Chain LLMQ Node v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let (event_loop, events) =
            QuorumEventLoop::new(Arc::clone(&self.container.manager), config.network.event_queue);
        *self.event_loop.lock() = Some(tokio::spawn(event_loop.run()));

        if let Some(tip) = self.container.chain.tip() {
            events
                .send(QuorumEvent::TipUpdated(tip))
                .await
                .context("Quorum event loop closed during startup")?;
        }
        *self.events.lock() = Some(events);

        info!("Network: {}", config.llmq.network);
        info!("Data Dir: {:?}", config.storage.data_dir);
        info!(
            "Mode: {}",
            if self.container.manager.active_masternode().is_some() {
                "masternode"
            } else if config.llmq.watch_quorums {
                "watch"
            } else {
                "regular"
            }
        );
        Ok(())
    }

    /// Sender for tip updates and p2p messages, once started.
    pub fn events(&self) -> Option<mpsc::Sender<QuorumEvent>> {
        self.events.lock().clone()
    }

    /// Shut the node down gracefully.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.container.manager.shutdown();
        self.events.lock().take();

        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Quorum event loop ended abnormally: {}", e),
                Err(_) => warn!("Quorum event loop did not stop within {:?}", SHUTDOWN_TIMEOUT),
            }
        }
        info!("Shutdown complete");
    }

    /// Get a reference to the node container.
    pub fn container(&self) -> Arc<NodeContainer> {
        Arc::clone(&self.container)
    }
}
