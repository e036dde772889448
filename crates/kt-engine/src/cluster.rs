//! Propagation of applied configuration to cluster peers.

use std::sync::Arc;

use async_trait::async_trait;
use kt_types::{TuneError, TuneResult, TuningMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{error, info};

use crate::config::DaemonConfig;

/// One nested duplex call to a peer node.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Send the scripts to `peer` and block until it reports completion or
    /// the stream ends.
    async fn sync(&self, peer: &str, scripts: &str) -> TuneResult<()>;
}

/// JSON-lines peer link over TCP.
#[derive(Debug, Clone)]
pub struct TcpPeerLink {
    port: u16,
}

impl TcpPeerLink {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl PeerLink for TcpPeerLink {
    async fn sync(&self, peer: &str, scripts: &str) -> TuneResult<()> {
        let addr = format!("{peer}:{}", self.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TuneError::PeerSync {
                peer: peer.to_string(),
                message: e.to_string(),
            })?;
        let (reader, mut writer) = stream.into_split();

        let message = TuningMessage::SyncConfig {
            scripts: scripts.to_string(),
        };
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TuneError::PeerSync {
                peer: peer.to_string(),
                message: e.to_string(),
            })?;

        // Drain replies until the peer signals completion or hangs up.
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await.map_err(|e| TuneError::PeerSync {
            peer: peer.to_string(),
            message: e.to_string(),
        })? {
            if let Ok(TuningMessage::Ending { .. }) = serde_json::from_str(&line) {
                info!(peer = %peer, "peer reply status success");
                break;
            }
        }
        Ok(())
    }
}

/// Sequentially propagates an applied configuration to every configured
/// peer. The first failure aborts the remaining peers and surfaces to the
/// caller; already-synced peers are left applied.
#[derive(Clone)]
pub struct ClusterSync {
    enabled: bool,
    self_address: String,
    peers: Vec<String>,
    link: Arc<dyn PeerLink>,
}

impl ClusterSync {
    pub fn from_config(config: &DaemonConfig, link: Arc<dyn PeerLink>) -> Self {
        Self {
            enabled: config.protocol == "tcp",
            self_address: config.address.clone(),
            peers: config.peers(),
            link,
        }
    }

    /// Propagate `scripts` to all peers except self and blanks. A no-op for
    /// non-cluster transports or an empty payload.
    pub async fn propagate(&self, scripts: &str) -> TuneResult<()> {
        if !self.enabled || scripts.is_empty() || self.peers.is_empty() {
            return Ok(());
        }
        info!(peers = ?self.peers, "syncing configuration to cluster");

        for peer in &self.peers {
            if peer.is_empty() || *peer == self.self_address {
                continue;
            }
            if let Err(e) = self.link.sync(peer, scripts).await {
                error!(peer = %peer, error = %e, "peer failed to sync config");
                return Err(e);
            }
        }
        Ok(())
    }
}
