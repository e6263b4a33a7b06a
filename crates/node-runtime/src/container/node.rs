use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use qc_18_llmq::domain::DkgSessionManager;
use qc_18_llmq::{
    BlstWorker, InMemoryChain, InMemoryCommitmentIndex, InMemoryMasternodeList,
    InMemoryQuorumStore, QuorumDependencies, QuorumManager, QuorumStore,
};

use crate::adapters::{ChannelNetwork, NetworkCommand};
use crate::container::config::{NodeConfig, StorageBackend};

/// Quorum manager plus every adapter it depends on.
pub struct NodeContainer {
    pub config: NodeConfig,
    pub chain: Arc<InMemoryChain>,
    pub masternodes: Arc<InMemoryMasternodeList>,
    pub commitments: Arc<InMemoryCommitmentIndex>,
    /// Filled by the external DKG driver; pruned on every synced tip.
    pub dkg_sessions: Arc<DkgSessionManager>,
    pub network: Arc<ChannelNetwork>,
    pub store: Arc<dyn QuorumStore>,
    pub manager: Arc<QuorumManager>,
    network_commands: Mutex<Option<mpsc::UnboundedReceiver<NetworkCommand>>>,
}

impl NodeContainer {
    /// Build the adapters and the manager for `config`.
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config)?;

        let chain = Arc::new(InMemoryChain::default());
        let masternodes = Arc::new(InMemoryMasternodeList::new(Vec::new()));
        let commitments = Arc::new(InMemoryCommitmentIndex::new());
        let dkg_sessions = Arc::new(DkgSessionManager::new());
        let (network, network_commands) = ChannelNetwork::new(config.network.ban_score);
        let network = Arc::new(network);

        let deps = QuorumDependencies {
            chain: chain.clone(),
            masternodes: masternodes.clone(),
            commitments: commitments.clone(),
            dkg: dkg_sessions.clone(),
            network: network.clone(),
            store: Arc::clone(&store),
            worker: BlstWorker::shared(),
        };
        let manager = Arc::new(
            QuorumManager::new(deps, config.llmq.clone())
                .context("Failed to create quorum manager")?,
        );
        manager.set_active_masternode(config.active_masternode()?);

        Ok(Self {
            config,
            chain,
            masternodes,
            commitments,
            dkg_sessions,
            network,
            store,
            manager,
            network_commands: Mutex::new(Some(network_commands)),
        })
    }

    /// Receiving end of the network command channel. Only the first caller
    /// gets it.
    pub fn take_network_commands(&self) -> Option<mpsc::UnboundedReceiver<NetworkCommand>> {
        self.network_commands.lock().take()
    }
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn QuorumStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("[qc-18] Using in-memory quorum store");
            Ok(Arc::new(InMemoryQuorumStore::new()))
        }
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            use crate::adapters::{RocksDbConfig, RocksDbQuorumStore};
            let rocks = RocksDbConfig::in_data_dir(&config.storage.data_dir);
            info!("[qc-18] Opening RocksDB quorum store at {:?}", rocks.path);
            let store = RocksDbQuorumStore::open(rocks).context("Failed to open quorum store")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => {
            anyhow::bail!("storage backend 'rocksdb' requires building with the `rocksdb` feature")
        }
    }
}
