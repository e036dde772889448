//! kt-tuned: the tuning daemon. Accepts duplex JSON-lines sessions over TCP
//! and drives one tuning run per connection.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use kt_engine::{DaemonConfig, MessageSink, Orchestrator, SessionLock, TcpPeerLink};
use kt_optimizer::HttpSearchService;
use kt_project::ShellRunner;
use kt_types::{TuneError, TuneResult, TuningMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Writes each outbound message as one JSON line on the client socket.
struct LineSink {
    writer: OwnedWriteHalf,
}

#[async_trait]
impl MessageSink for LineSink {
    async fn deliver(&mut self, message: TuningMessage) -> TuneResult<()> {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(TuneError::Io)
    }
}

async fn handle_connection(orchestrator: Arc<Orchestrator>, stream: TcpStream) -> TuneResult<()> {
    let (read_half, write_half) = stream.into_split();
    let (in_tx, in_rx) = mpsc::channel(16);

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TuningMessage>(&line) {
                Ok(message) => {
                    if in_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "dropping malformed client message"),
            }
        }
    });

    let result = orchestrator
        .run_session(in_rx, LineSink { writer: write_half })
        .await;
    reader.abort();
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("KT_TUNED_CONFIG") {
        Ok(path) => DaemonConfig::load(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => DaemonConfig::default(),
    };
    let config = Arc::new(config);

    let service = Arc::new(HttpSearchService::new(
        &config.optimizer_url,
        config.request_timeout(),
    )?);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&config),
        service,
        Arc::new(ShellRunner),
        Arc::new(TcpPeerLink::new(config.port)),
        SessionLock::new(),
    ));

    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("binding {}", config.listen_addr()))?;
    info!(addr = %config.listen_addr(), cluster = config.is_cluster(), "kt-tuned listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(peer = %peer, "client connected");
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(orchestrator, stream).await {
                warn!(peer = %peer, error = %e, "session ended with error");
            }
        });
    }
}
