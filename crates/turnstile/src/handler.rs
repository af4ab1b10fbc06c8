//! Per-peer handler: bridges one WebSocket peer onto the bus.
//!
//! Each accepted peer gets its own Tokio task running this handler.
//! The flow is:
//!   1. Loop: receive frames → `sub` / `unsub` / `pub` against the bus
//!   2. Meanwhile a writer task forwards matching bus messages as `msg`
//!   3. On close, error, or idle timeout: drop every subscription
//!
//! A peer counts as idle only when it neither sent a frame nor had a
//! `msg` forwarded to it for a whole `idle_timeout`. Listen-only peers
//! stay connected as long as traffic reaches them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use turnstile_protocol::{Codec, Frame};
use turnstile_transport::{Connection, WebSocketConnection};

use crate::bus::{Registration, Tagged};
use crate::{Bus, TurnstileError};

/// Handles a single peer from accept to close.
pub(crate) async fn handle_peer<C: Codec + Clone>(
    conn: WebSocketConnection,
    bus: Bus,
    codec: C,
    idle_timeout: Option<Duration>,
) -> Result<(), TurnstileError> {
    let conn = Arc::new(conn);
    let peer_id = conn.id();
    tracing::debug!(%peer_id, "peer connected");

    let (tx, rx) = mpsc::unbounded_channel::<Tagged>();
    let forwarded = Arc::new(AtomicU64::new(0));
    let writer = tokio::spawn(forward_messages(
        Arc::clone(&conn),
        codec.clone(),
        rx,
        Arc::clone(&forwarded),
    ));
    let mut forwarded_seen = 0;
    let mut subscriptions: HashMap<u64, Registration> = HashMap::new();

    let result = loop {
        let received = match idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, conn.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    let now = forwarded.load(Ordering::Relaxed);
                    if now != forwarded_seen {
                        forwarded_seen = now;
                        continue;
                    }
                    tracing::info!(%peer_id, "peer idle, closing");
                    break Ok(());
                }
            },
            None => conn.recv().await,
        };
        let data = match received {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%peer_id, "peer closed cleanly");
                break Ok(());
            }
            Err(e) => {
                tracing::debug!(%peer_id, error = %e, "recv error");
                break Err(TurnstileError::Transport(e));
            }
        };

        let frame: Frame = match codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%peer_id, error = %e, "undecodable frame");
                send_error(&conn, &codec, format!("invalid frame: {e}")).await?;
                continue;
            }
        };

        match frame {
            Frame::Sub { sid, subject } => {
                match bus.subscribe_tagged(&subject, sid, tx.clone()) {
                    Ok(registration) => {
                        // Reusing a sid replaces the old subscription.
                        subscriptions.insert(sid, registration);
                        tracing::debug!(%peer_id, sid, %subject, "peer subscribed");
                    }
                    Err(e) => send_error(&conn, &codec, e.to_string()).await?,
                }
            }
            Frame::Unsub { sid } => {
                if subscriptions.remove(&sid).is_none() {
                    send_error(&conn, &codec, format!("unknown sid {sid}")).await?;
                }
            }
            Frame::Pub {
                subject,
                reply,
                data,
            } => {
                if let Err(e) = bus.publish(&subject, reply, data) {
                    send_error(&conn, &codec, e.to_string()).await?;
                }
            }
            Frame::Msg { .. } | Frame::Err { .. } => {
                send_error(&conn, &codec, "peers may only send sub, unsub, and pub".into())
                    .await?;
            }
        }
    };

    drop(subscriptions);
    writer.abort();
    let _ = conn.close().await;
    tracing::debug!(%peer_id, "peer disconnected");
    result
}

/// Writes every bus message delivered for this peer as a `msg` frame.
async fn forward_messages<C: Codec>(
    conn: Arc<WebSocketConnection>,
    codec: C,
    mut rx: mpsc::UnboundedReceiver<Tagged>,
    forwarded: Arc<AtomicU64>,
) {
    while let Some((sid, message)) = rx.recv().await {
        let frame = Frame::Msg {
            sid,
            subject: message.subject,
            reply: message.reply,
            data: message.data,
        };
        let bytes = match codec.encode(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode msg frame");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(peer_id = %conn.id(), error = %e, "send failed, stopping writer");
            break;
        }
        forwarded.fetch_add(1, Ordering::Relaxed);
    }
}

async fn send_error<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    message: String,
) -> Result<(), TurnstileError> {
    let bytes = codec.encode(&Frame::Err { message })?;
    conn.send(&bytes).await?;
    Ok(())
}
