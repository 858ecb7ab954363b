use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::fault::FaultSink;
use crate::proxy::pipe;
use crate::proxy::registry::{ConnId, SessionRegistry};

pub async fn run(cfg: Config, sink: Arc<dyn FaultSink>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("Listening on {}", cfg.listen_addr);

    let cfg = Arc::new(cfg);
    let registry = Arc::new(Mutex::new(SessionRegistry::new()));
    let next_id = AtomicU64::new(1);

    loop {
        let (socket, peer) = listener.accept().await?;
        let id = ConnId(next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(conn = %id, %peer, "Accepted client connection");

        let cfg = cfg.clone();
        let registry = registry.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            if let Err(e) = pipe::serve_client(cfg, registry, sink, socket, id).await {
                tracing::error!(conn = %id, "Connection error from {}: {}", peer, e);
            }
        });
    }
}
