use std::sync::Arc;

use portway::config::Config;
use portway::fault::{FaultSink, LogSink};
use portway::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let sink: Arc<dyn FaultSink> = Arc::new(LogSink);

    tokio::select! {
        res = server::listener::run(cfg, sink) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
