//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kt_types::{TuneError, TuneResult};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration of the tuning daemon, loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Session transport: cluster sync only runs under "tcp".
    pub protocol: String,
    /// Listen address of this node.
    pub address: String,
    pub port: u16,
    /// Comma-joined static peer list for cluster propagation.
    pub connect: String,
    /// Directory of project definition YAML files.
    pub project_path: PathBuf,
    /// Directory for per-project tuning logs and baseline files.
    pub temp_path: PathBuf,
    /// Default feature-filter retention ratio.
    pub skip_percentage: f64,
    /// Base URL of the remote search service.
    pub optimizer_url: String,
    /// Deadline applied to every remote call.
    pub request_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            address: "127.0.0.1".to_string(),
            port: 60001,
            connect: String::new(),
            project_path: PathBuf::from("/etc/kt-tuned/tuning"),
            temp_path: PathBuf::from("/run/kt-tuned"),
            skip_percentage: 0.6,
            optimizer_url: "http://localhost:8383/v1/optimizer".to_string(),
            request_timeout_secs: 3600,
        }
    }
}

impl DaemonConfig {
    /// Load from `path`. A missing file is a configuration error; the caller
    /// decides whether to fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> TuneResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TuneError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| TuneError::Config(format!("parse {}: {e}", path.display())))?;
        info!(path = %path.display(), "daemon configuration loaded");
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Configured peers, trimmed, blanks removed.
    pub fn peers(&self) -> Vec<String> {
        self.connect
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Whether this deployment can propagate configuration to peers.
    pub fn is_cluster(&self) -> bool {
        self.protocol == "tcp" && !self.peers().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
