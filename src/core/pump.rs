//! Per-connection reader and writer loops
//!
//! Both pumps are generic over the transport halves so they can run on a
//! warp WebSocket or on any in-memory `Sink`/`Stream` pair.

use futures_util::sink::{Sink, SinkExt};
use futures_util::stream::{Stream, StreamExt};
use log::{debug, info, trace, warn};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use warp::ws::Message;

use crate::config::HubConfig;
use crate::core::connection::{Connection, Delivery, OutboundQueue};
use crate::core::envelope::{BroadcastRequest, ClientFrame, Envelope, Event, Scope};
use crate::core::hub::HubHandle;
use crate::error::{Result, RustyHubError};

/// Timing parameters shared by both pumps
#[derive(Debug, Clone, Copy)]
pub struct PumpSettings {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub write_timeout: Duration,
}

impl From<&HubConfig> for PumpSettings {
    fn from(config: &HubConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            write_timeout: config.write_timeout,
        }
    }
}

async fn send_with_deadline<S>(sink: &mut S, message: Message, deadline: Duration) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RustyHubError::ConnectionError(e.to_string())),
        Err(_) => Err(RustyHubError::WriteTimeout),
    }
}

/// Drain the outbound queue to the transport, pinging on a fixed period.
///
/// Application writes never reset the ping ticker; a listen-only peer only
/// refreshes its reader deadline by answering pings.
///
/// Ends when the hub closes the queue or a write fails; either way the
/// connection's unregistration is submitted before returning.
pub async fn write_pump<S>(
    connection: Arc<Connection>,
    mut queue: OutboundQueue,
    mut sink: S,
    hub: HubHandle,
    settings: PumpSettings,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let period = settings.heartbeat_interval;
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(envelope) = next else {
                    debug!("Outbound queue closed for connection {}", connection.id());
                    if let Err(e) = send_with_deadline(&mut sink, Message::close(), settings.write_timeout).await {
                        trace!("Close frame not delivered to {}: {}", connection.id(), e);
                    }
                    break;
                };
                let text = match envelope.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize {} envelope: {}", envelope.event.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = send_with_deadline(&mut sink, Message::text(text), settings.write_timeout).await {
                    warn!("Write to connection {} failed: {}", connection.id(), e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                trace!("Heartbeat ping to connection {}", connection.id());
                if let Err(e) = send_with_deadline(&mut sink, Message::ping(Vec::new()), settings.write_timeout).await {
                    warn!("Heartbeat to connection {} failed: {}", connection.id(), e);
                    break;
                }
            }
        }
    }

    if let Ok(Err(e)) = timeout(settings.write_timeout, sink.close()).await {
        trace!("Closing sink of connection {}: {}", connection.id(), e);
    }
    if hub.unregister(connection.id()).is_err() {
        debug!("Hub gone while stopping writer of {}", connection.id());
    }
}

/// Read inbound frames until the peer leaves, errors or goes silent for
/// longer than the heartbeat timeout, then submit unregistration.
pub async fn read_pump<St, E>(
    connection: Arc<Connection>,
    mut stream: St,
    hub: HubHandle,
    settings: PumpSettings,
) where
    St: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = match timeout(settings.heartbeat_timeout, stream.next()).await {
            Err(_) => {
                info!(
                    "Connection {} silent for {:?}, closing",
                    connection.id(),
                    settings.heartbeat_timeout
                );
                break;
            }
            Ok(None) => {
                debug!("Connection {} stream ended", connection.id());
                break;
            }
            Ok(Some(Err(e))) => {
                warn!("Read from connection {} failed: {}", connection.id(), e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        if frame.is_close() {
            debug!("Connection {} sent close", connection.id());
            break;
        }
        if frame.is_text() {
            handle_text_frame(&connection, &frame, &hub);
        } else if frame.is_binary() {
            trace!("Ignoring binary frame from {}", connection.id());
        }
    }

    if hub.unregister(connection.id()).is_err() {
        debug!("Hub gone while stopping reader of {}", connection.id());
    }
}

fn handle_text_frame(connection: &Arc<Connection>, frame: &Message, hub: &HubHandle) {
    let Ok(text) = frame.to_str() else {
        return;
    };
    let control = match serde_json::from_str::<ClientFrame>(text) {
        Ok(control) => control,
        Err(e) => {
            warn!("Unrecognized frame from connection {}: {}", connection.id(), e);
            return;
        }
    };

    match control {
        ClientFrame::Ping => {
            // Answered directly; no fan-out involved
            let pong = Envelope::stamp(
                Event::Pong,
                Scope::user(connection.workspace_id(), connection.user_id()),
            );
            match connection.try_send(Arc::new(pong)) {
                Delivery::Queued => {}
                outcome => debug!("Pong for {} not queued: {:?}", connection.id(), outcome),
            }
        }
        ClientFrame::TypingStart { channel_id } => submit_typing(connection, hub, channel_id, true),
        ClientFrame::TypingStop { channel_id } => submit_typing(connection, hub, channel_id, false),
    }
}

fn submit_typing(connection: &Arc<Connection>, hub: &HubHandle, channel_id: i64, typing: bool) {
    let user = connection.user();
    let request = BroadcastRequest::new(
        Scope::channel(connection.workspace_id(), channel_id).excluding(connection.id()),
        Event::UserTyping {
            user_id: user.id,
            username: user.shown_name().to_string(),
            channel_id,
            typing,
        },
    );
    if let Err(e) = hub.broadcast(request) {
        warn!("Typing signal from {} not submitted: {}", connection.id(), e);
    }
}
