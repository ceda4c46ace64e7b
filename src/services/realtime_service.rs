use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dto::realtime::{RealtimeInboundMessage, RealtimeOutboundMessage},
    realtime::{Channel, JoinOptions, LocalChannel, RealtimeError},
    state::SharedState,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Frames queued for one client before it is considered stalled and disconnected.
const OUTBOUND_CAPACITY: usize = 64;

/// Failures while relaying frames of one socket.
#[derive(Debug, Error)]
enum RelayError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// Outbound queue is full: the client stopped reading.
    #[error("client is not reading; outbound queue full")]
    SlowConsumer,
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

/// Relay one WebSocket client onto `topic` of the shared hub until either side goes away.
pub async fn handle_socket(state: SharedState, socket: WebSocket, topic: String) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(JOIN_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.try_send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(topic = %topic, error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(topic = %topic, "websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let Ok(RealtimeInboundMessage::Join { key, self_echo }) =
        serde_json::from_str::<RealtimeInboundMessage>(initial_message.as_str())
    else {
        warn!(topic = %topic, "first message was not a join");
        let _ = outbound_tx.try_send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let options = JoinOptions {
        presence_key: key,
        self_echo,
    };
    let channel = match state.hub().join_local(&topic, options) {
        Ok(channel) => channel,
        Err(err) => {
            warn!(topic = %topic, error = %err, "realtime join rejected");
            let _ = outbound_tx.try_send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let joined = RealtimeOutboundMessage::Joined {
        key: channel.presence_key().to_string(),
    };
    if send_message_to_websocket(&outbound_tx, &joined).is_err() {
        let _ = channel.leave().await;
        finalize(writer_task, outbound_tx).await;
        return;
    }
    info!(topic = %topic, key = channel.presence_key(), "realtime client joined");

    let mut forward_task = spawn_forwarder(&channel, outbound_tx.clone());
    let mut forwarder_stopped = false;

    loop {
        let message = tokio::select! {
            message = receiver.next() => message,
            _ = &mut forward_task => {
                forwarder_stopped = true;
                let _ = outbound_tx.try_send(Message::Close(None));
                break;
            }
        };
        let Some(message) = message else {
            break;
        };
        match message {
            Ok(Message::Text(text)) => {
                if let Err(err) = handle_frame(&channel, text.as_str()).await {
                    warn!(topic = %topic, error = %err, "failed to relay realtime frame");
                    if matches!(err, RelayError::Realtime(RealtimeError::Closed { .. })) {
                        break;
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.try_send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.try_send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(topic = %topic, error = %err, "websocket error");
                break;
            }
        }
    }

    let _ = channel.leave().await;
    if !forwarder_stopped {
        forward_task.abort();
        let _ = forward_task.await;
    }
    info!(topic = %topic, key = channel.presence_key(), "realtime client left");

    finalize(writer_task, outbound_tx).await;
}

/// Apply one inbound frame to the joined channel.
async fn handle_frame(channel: &LocalChannel, text: &str) -> Result<(), RelayError> {
    match serde_json::from_str::<RealtimeInboundMessage>(text) {
        Ok(RealtimeInboundMessage::Broadcast { event, payload }) => {
            channel.broadcast(&event, payload).await?;
        }
        Ok(RealtimeInboundMessage::Track { payload }) => {
            channel.track_presence(payload).await?;
        }
        Ok(RealtimeInboundMessage::Join { .. }) => {
            warn!(topic = channel.topic(), "ignoring duplicate join message");
        }
        Ok(RealtimeInboundMessage::Unknown) => {
            debug!(topic = channel.topic(), "ignoring unknown realtime message");
        }
        Err(err) => {
            warn!(topic = channel.topic(), error = %err, "failed to parse realtime message");
        }
    }
    Ok(())
}

/// Push hub broadcasts and presence snapshots to the socket until the channel closes
/// or the client falls [`OUTBOUND_CAPACITY`] frames behind.
fn spawn_forwarder(channel: &LocalChannel, outbound_tx: mpsc::Sender<Message>) -> JoinHandle<()> {
    let topic = channel.topic().to_string();
    let mut broadcasts = channel.on_any_broadcast();
    let mut presence = channel.on_presence_sync();

    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some((event, payload)) = broadcasts.next() => {
                    RealtimeOutboundMessage::Broadcast { event, payload }
                }
                Some(state) = presence.next() => RealtimeOutboundMessage::PresenceSync { state },
                else => break,
            };
            match send_message_to_websocket(&outbound_tx, &message) {
                Ok(()) => {}
                Err(RelayError::SlowConsumer) => {
                    warn!(topic = %topic, "realtime client stalled; disconnecting");
                    break;
                }
                Err(_) => break,
            }
        }
    })
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; a closed or full writer is reported.
fn send_message_to_websocket<T>(
    tx: &mpsc::Sender<Message>,
    value: &T,
) -> Result<(), RelayError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.try_send(Message::Text(payload.into()))
        .map_err(|err| match err {
            TrySendError::Full(_) => RelayError::SlowConsumer,
            TrySendError::Closed(_) => RelayError::ConnectionClosed,
        })
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::Sender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::realtime::LocalHub;

    use super::*;

    #[tokio::test]
    async fn frames_are_applied_to_the_channel() {
        let hub = LocalHub::default();
        let relay = hub
            .join_local("lobby:p1", JoinOptions::with_presence_key("relay01"))
            .unwrap();
        let listener = hub.join_local("lobby:p1", JoinOptions::default()).unwrap();
        let mut reactions = listener.on_broadcast("reaction");

        handle_frame(
            &relay,
            r#"{"type":"broadcast","event":"reaction","payload":{"emoji":"🔥"}}"#,
        )
        .await
        .unwrap();
        handle_frame(&relay, r#"{"type":"track","payload":{"online_at":"now"}}"#)
            .await
            .unwrap();
        handle_frame(&relay, "not json").await.unwrap();

        assert_eq!(reactions.next().await, Some(json!({"emoji": "🔥"})));
        assert!(hub.presence("lobby:p1").contains_key("relay01"));
    }

    #[tokio::test]
    async fn forwarder_pushes_broadcasts_as_text_frames() {
        let hub = LocalHub::default();
        let relay = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();
        let other = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let task = spawn_forwarder(&relay, tx);

        // initial presence snapshot
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Message::Text(ref text) if text.as_str().contains("presence_sync")));

        other.broadcast("reaction", json!({"x": 5})).await.unwrap();
        let Some(Message::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value, json!({"type": "broadcast", "event": "reaction", "payload": {"x": 5}}));

        relay.leave().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn forwarder_stops_when_the_client_stops_reading() {
        let hub = LocalHub::default();
        let relay = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();
        let other = hub.join_local("reactions:p1", JoinOptions::default()).unwrap();
        let (tx, rx) = mpsc::channel(2);
        let task = spawn_forwarder(&relay, tx);

        for n in 0..4 {
            other.broadcast("reaction", json!({"x": n})).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("forwarder should give up on a stalled client")
            .unwrap();
        assert_eq!(rx.len(), 2);
    }
}
