//! `RelayPool` over plain WebSockets: one connection per relay per request.

use comic_core::{Event, RelayUrl};
use futures::future::join_all;
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::filter::Filter;
use crate::message::{ClientMessage, RelayMessage};
use crate::pool::{PublishOutcome, RelayError, RelayPool, Subscription, SubscriptionItem, dedupe_by_id};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

static NEXT_SUB_ID: AtomicU64 = AtomicU64::new(1);

fn next_sub_id() -> String {
    format!("comic-{}", NEXT_SUB_ID.fetch_add(1, Ordering::Relaxed))
}

/// Default time a relay gets to connect and answer.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WsRelayPool {
    timeout: Duration,
}

impl Default for WsRelayPool {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_TIMEOUT)
    }
}

impl WsRelayPool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn query_relay(
        &self,
        relay: &RelayUrl,
        filter: &Filter,
        max_wait: Duration,
    ) -> Result<Vec<Event>, RelayError> {
        let mut socket = connect(relay, self.timeout).await?;
        let sub_id = next_sub_id();
        send(&mut socket, relay, ClientMessage::Req { sub_id: &sub_id, filter }).await?;
        // The wait covers the answer only, not the handshake.
        let deadline = Instant::now() + max_wait;

        let mut events = Vec::new();
        loop {
            let msg = match tokio::time::timeout_at(deadline, socket.next()).await {
                Err(_) if events.is_empty() => {
                    let _ = socket.close(None).await;
                    return Err(RelayError::Timeout(relay.clone()));
                }
                Err(_) => {
                    tracing::debug!("{relay} did not send EOSE in time, keeping {} events", events.len());
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    if events.is_empty() {
                        return Err(RelayError::Connect {
                            relay: relay.clone(),
                            reason: err.to_string(),
                        });
                    }
                    break;
                }
                Ok(Some(Ok(msg))) => msg,
            };
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match RelayMessage::parse(&text) {
                Some(RelayMessage::Event { sub_id: id, event }) if id == sub_id => {
                    if accept(relay, filter, &event) {
                        events.push(event);
                    }
                }
                Some(RelayMessage::Eose { sub_id: id }) if id == sub_id => break,
                Some(RelayMessage::Closed { sub_id: id, message }) if id == sub_id => {
                    if events.is_empty() {
                        return Err(RelayError::Closed(format!("{relay}: {message}")));
                    }
                    break;
                }
                Some(RelayMessage::Notice(notice)) => tracing::debug!("notice from {relay}: {notice}"),
                _ => {}
            }
        }

        let _ = send(&mut socket, relay, ClientMessage::Close { sub_id: &sub_id }).await;
        let _ = socket.close(None).await;
        Ok(events)
    }

    async fn publish_relay(&self, relay: &RelayUrl, event: &Event) -> Result<(), RelayError> {
        let mut socket = connect(relay, self.timeout).await?;
        send(&mut socket, relay, ClientMessage::Event(event)).await?;

        let deadline = Instant::now() + self.timeout;
        let result = loop {
            let msg = match tokio::time::timeout_at(deadline, socket.next()).await {
                Err(_) => break Err(RelayError::Timeout(relay.clone())),
                Ok(None) | Ok(Some(Err(_))) => {
                    break Err(RelayError::Connect {
                        relay: relay.clone(),
                        reason: "connection closed before OK".into(),
                    });
                }
                Ok(Some(Ok(msg))) => msg,
            };
            let Message::Text(text) = msg else { continue };
            if let Some(RelayMessage::Ok {
                event_id,
                accepted,
                message,
            }) = RelayMessage::parse(&text)
            {
                if event_id != event.id {
                    continue;
                }
                break if accepted {
                    Ok(())
                } else {
                    Err(RelayError::Rejected {
                        relay: relay.clone(),
                        reason: message,
                    })
                };
            }
        };

        let _ = socket.close(None).await;
        result
    }
}

fn accept(relay: &RelayUrl, filter: &Filter, event: &Event) -> bool {
    if !event.verify_id() {
        tracing::warn!("dropping event {} from {relay}: id does not match content", event.id);
        return false;
    }
    filter.matches(event)
}

async fn connect(relay: &RelayUrl, timeout: Duration) -> Result<Socket, RelayError> {
    match tokio::time::timeout(timeout, connect_async(relay.as_str())).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(err)) => Err(RelayError::Connect {
            relay: relay.clone(),
            reason: err.to_string(),
        }),
        Err(_) => Err(RelayError::Timeout(relay.clone())),
    }
}

async fn send(socket: &mut Socket, relay: &RelayUrl, msg: ClientMessage<'_>) -> Result<(), RelayError> {
    socket
        .send(Message::Text(msg.to_json()))
        .await
        .map_err(|err| RelayError::Connect {
            relay: relay.clone(),
            reason: err.to_string(),
        })
}

/// What one relay task reports to the subscription coordinator.
enum Feed {
    Event(Event),
    Eose,
    Gone(String),
}

async fn stream_relay(
    index: usize,
    relay: RelayUrl,
    filter: Filter,
    timeout: Duration,
    feed: mpsc::Sender<(usize, Feed)>,
) {
    let mut socket = match connect(&relay, timeout).await {
        Ok(socket) => socket,
        Err(err) => {
            let _ = feed.send((index, Feed::Gone(err.to_string()))).await;
            return;
        }
    };
    let sub_id = next_sub_id();
    if let Err(err) = send(&mut socket, &relay, ClientMessage::Req { sub_id: &sub_id, filter: &filter }).await {
        let _ = feed.send((index, Feed::Gone(err.to_string()))).await;
        return;
    }

    let eose_deadline = Instant::now() + timeout;
    let mut eose_seen = false;
    loop {
        let next = if eose_seen {
            Ok(socket.next().await)
        } else {
            tokio::time::timeout_at(eose_deadline, socket.next()).await
        };
        let item = match next {
            Err(_) => {
                tracing::debug!("{relay} did not send EOSE in time");
                eose_seen = true;
                Feed::Eose
            }
            Ok(Some(Ok(Message::Text(text)))) => match RelayMessage::parse(&text) {
                Some(RelayMessage::Event { sub_id: id, event }) if id == sub_id => {
                    if !accept(&relay, &filter, &event) {
                        continue;
                    }
                    Feed::Event(event)
                }
                Some(RelayMessage::Eose { sub_id: id }) if id == sub_id => {
                    eose_seen = true;
                    Feed::Eose
                }
                Some(RelayMessage::Closed { sub_id: id, message }) if id == sub_id => {
                    Feed::Gone(format!("{relay}: {message}"))
                }
                _ => continue,
            },
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => Feed::Gone(format!("{relay}: connection closed")),
            Ok(Some(Err(err))) => Feed::Gone(format!("{relay}: {err}")),
            Ok(Some(Ok(_))) => continue,
        };
        let done = matches!(item, Feed::Gone(_));
        if feed.send((index, item)).await.is_err() || done {
            return;
        }
    }
}

/// Merges relay feeds: deduplicates events, emits one EOSE once every relay
/// has either sent its EOSE or gone away, and reports `Closed` when no relay
/// is left.
async fn coordinate(
    relay_count: usize,
    mut feed: mpsc::Receiver<(usize, Feed)>,
    out: mpsc::Sender<SubscriptionItem>,
) {
    let mut settled = vec![false; relay_count];
    let mut any_eose = false;
    let mut eose_emitted = false;
    let mut gone = 0;
    let mut reasons = Vec::new();
    let mut seen = HashSet::new();

    while let Some((index, item)) = feed.recv().await {
        match item {
            Feed::Event(event) => {
                if seen.insert(event.id.clone())
                    && out.send(SubscriptionItem::Event(event)).await.is_err()
                {
                    return;
                }
            }
            Feed::Eose => {
                if !settled[index] {
                    settled[index] = true;
                    any_eose = true;
                }
            }
            Feed::Gone(reason) => {
                tracing::debug!("subscription lost a relay: {reason}");
                settled[index] = true;
                gone += 1;
                reasons.push(reason);
            }
        }

        if !eose_emitted && settled.iter().all(|s| *s) {
            if !any_eose {
                let _ = out.send(SubscriptionItem::Closed(reasons.join(", "))).await;
                return;
            }
            eose_emitted = true;
            if out.send(SubscriptionItem::Eose).await.is_err() {
                return;
            }
        }
        if gone == relay_count {
            let _ = out.send(SubscriptionItem::Closed(reasons.join(", "))).await;
            return;
        }
    }
}

#[async_trait::async_trait]
impl RelayPool for WsRelayPool {
    async fn query(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        max_wait: Option<Duration>,
    ) -> Result<Vec<Event>, RelayError> {
        if relays.is_empty() {
            return Err(RelayError::NoRelays);
        }
        let max_wait = max_wait.unwrap_or(self.timeout);
        let results = join_all(relays.iter().map(|relay| self.query_relay(relay, filter, max_wait))).await;

        let mut events = Vec::new();
        let mut failures = Vec::new();
        for (relay, result) in relays.iter().zip(results) {
            match result {
                Ok(found) => events.extend(found),
                Err(err) => {
                    tracing::warn!("query on {relay} failed: {err}");
                    failures.push(err.to_string());
                }
            }
        }
        if failures.len() == relays.len() {
            return Err(RelayError::AllFailed(failures));
        }
        Ok(dedupe_by_id(events))
    }

    async fn subscribe(&self, relays: &[RelayUrl], filter: &Filter) -> Result<Subscription, RelayError> {
        if relays.is_empty() {
            return Err(RelayError::NoRelays);
        }
        let (feed_tx, feed_rx) = mpsc::channel(256);
        let (out_tx, out_rx) = mpsc::channel(256);

        let mut tasks = Vec::with_capacity(relays.len() + 1);
        for (index, relay) in relays.iter().enumerate() {
            let handle = tokio::spawn(stream_relay(
                index,
                relay.clone(),
                filter.clone(),
                self.timeout,
                feed_tx.clone(),
            ));
            tasks.push(handle.abort_handle());
        }
        drop(feed_tx);
        let handle = tokio::spawn(coordinate(relays.len(), feed_rx, out_tx));
        tasks.push(handle.abort_handle());

        Ok(Subscription::new(out_rx, tasks))
    }

    async fn publish(&self, relays: &[RelayUrl], event: &Event) -> Vec<PublishOutcome> {
        let results = join_all(relays.iter().map(|relay| self.publish_relay(relay, event))).await;
        relays
            .iter()
            .zip(results)
            .map(|(relay, result)| {
                match &result {
                    Ok(()) => tracing::debug!("{relay} accepted {}", event.id),
                    Err(err) => tracing::warn!("publish to {relay} failed: {err}"),
                }
                PublishOutcome {
                    relay: relay.clone(),
                    result,
                }
            })
            .collect()
    }
}
