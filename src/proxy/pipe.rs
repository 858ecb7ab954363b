//! Drives one proxy session against live sockets.
//!
//! This is the tokio realization of the reactor: a per-connection task
//! reads the first packet, admits it through the registry, dials upstream
//! with the configured timeout and then pumps a select loop, feeding read
//! results into the state machine as events and performing the actions it
//! answers with. The registry lock is only held across pure transitions,
//! never across I/O.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::Config;
use crate::fault::{Fault, FaultSink};
use crate::proxy::registry::{Admission, ConnId, SessionRegistry};
use crate::proxy::session::{SessionAction, SessionEvent};

pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

/// Handles a freshly accepted client connection from first packet to
/// teardown.
pub async fn serve_client(
    cfg: Arc<Config>,
    registry: SharedRegistry,
    sink: Arc<dyn FaultSink>,
    mut client: TcpStream,
    id: ConnId,
) -> Result<()> {
    let mut buf = vec![0u8; cfg.max_packet_bytes];
    let n = client.read(&mut buf).await?;
    if n == 0 {
        // Closed before sending anything.
        return Ok(());
    }
    let first = Bytes::copy_from_slice(&buf[..n]);

    let admission = registry.lock().await.admit(id, first);
    let upstream_addr = match admission {
        Admission::Created { upstream_addr, is_tunnel } => {
            tracing::debug!(conn = %id, upstream = %upstream_addr, tunnel = is_tunnel, "session opened");
            upstream_addr
        }
        Admission::Existing(_) => {
            anyhow::bail!("fresh connection {id} already had a session");
        }
        Admission::Rejected(e) => {
            sink.record(Fault::malformed_request(format!(
                "rejected first packet on {id}: {e:?}"
            )));
            // Dropping the stream closes the client; no upstream was dialed.
            return Ok(());
        }
    };

    run_session(cfg, registry, sink, client, id, upstream_addr).await
}

/// Connects upstream and relays for an already-admitted session.
pub async fn run_session(
    cfg: Arc<Config>,
    registry: SharedRegistry,
    sink: Arc<dyn FaultSink>,
    mut client: TcpStream,
    id: ConnId,
    upstream_addr: String,
) -> Result<()> {
    // Single attempt, no retries.
    let mut upstream = match timeout(cfg.connect_timeout(), dial(&upstream_addr, &cfg)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return fail_connect(registry, sink, client, id, &upstream_addr, &e.to_string()).await;
        }
        Err(_) => {
            return fail_connect(registry, sink, client, id, &upstream_addr, "timed out").await;
        }
    };

    let mut client_buf = vec![0u8; cfg.max_packet_bytes];
    let mut upstream_buf = vec![0u8; cfg.max_packet_bytes];

    // Seeding the connect resolution through the same event path sends the
    // tunnel handshake or the queued request bytes before any relaying.
    let mut next_event = Some(SessionEvent::UpstreamConnected);

    loop {
        let event = match next_event.take() {
            Some(event) => event,
            None => tokio::select! {
                res = client.read(&mut client_buf) => match res {
                    Ok(0) => SessionEvent::ClientClosed,
                    Ok(n) => SessionEvent::ClientBytes(Bytes::copy_from_slice(&client_buf[..n])),
                    // An early client disconnect is normal teardown.
                    Err(_) => SessionEvent::ClientClosed,
                },
                res = upstream.read(&mut upstream_buf) => match res {
                    Ok(0) => SessionEvent::UpstreamClosed,
                    Ok(n) => SessionEvent::UpstreamBytes(Bytes::copy_from_slice(&upstream_buf[..n])),
                    Err(e) => {
                        sink.record(Fault::upstream_runtime(format!(
                            "read from {upstream_addr} failed on {id}: {e}"
                        )));
                        SessionEvent::UpstreamFailed
                    }
                },
            },
        };

        let actions = registry.lock().await.apply(id, event);

        let mut finished = false;
        for action in actions {
            match action {
                SessionAction::SendClient(bytes) => {
                    // A client that went away mid-relay is a no-op; its
                    // closure surfaces on the next read.
                    let _ = client.write_all(&bytes).await;
                }
                SessionAction::SendUpstream(bytes) => {
                    if let Err(e) = upstream.write_all(&bytes).await {
                        sink.record(Fault::upstream_runtime(format!(
                            "write to {upstream_addr} failed on {id}: {e}"
                        )));
                        next_event = Some(SessionEvent::UpstreamFailed);
                    }
                }
                SessionAction::CloseClient => {
                    let _ = client.shutdown().await;
                }
                SessionAction::CloseUpstream => {
                    let _ = upstream.shutdown().await;
                }
                SessionAction::Remove => {
                    finished = true;
                }
            }
        }

        if finished {
            tracing::debug!(conn = %id, upstream = %upstream_addr, "session closed");
            return Ok(());
        }
    }
}

async fn fail_connect(
    registry: SharedRegistry,
    sink: Arc<dyn FaultSink>,
    mut client: TcpStream,
    id: ConnId,
    upstream_addr: &str,
    reason: &str,
) -> Result<()> {
    sink.record(Fault::upstream_connect(format!(
        "connect to {upstream_addr} failed on {id}: {reason}"
    )));

    let actions = registry
        .lock()
        .await
        .apply(id, SessionEvent::UpstreamConnectFailed);
    for action in actions {
        if action == SessionAction::CloseClient {
            let _ = client.shutdown().await;
        }
    }

    Ok(())
}

/// Resolves and dials the upstream address, honoring the configured socket
/// buffer sizes.
async fn dial(addr: &str, cfg: &Config) -> Result<TcpStream> {
    let target = lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no address resolved for {addr}"))?;

    let socket = if target.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if let Some(bytes) = cfg.socket_buffer_bytes {
        socket.set_recv_buffer_size(bytes as u32)?;
        socket.set_send_buffer_size(bytes as u32)?;
    }

    Ok(socket.connect(target).await?)
}
