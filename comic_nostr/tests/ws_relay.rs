//! `WsRelayPool` against in-process axum relays.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use comic_core::{Event, Kind, RelayUrl, UnsignedEvent, event::tag};
use comic_nostr::{Filter, RelayError, RelayPool, SubscriptionItem, WsRelayPool};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    /// Never sends EOSE.
    silent: bool,
    reject: bool,
    reqs: usize,
    handshake_delay: Duration,
}

#[derive(Clone, Default)]
struct FakeRelay(Arc<Mutex<Inner>>);

impl FakeRelay {
    fn with_event(self, event: Event) -> Self {
        self.0.lock().unwrap().events.push(event);
        self
    }

    fn silent(self) -> Self {
        self.0.lock().unwrap().silent = true;
        self
    }

    /// Holds the upgrade response back for `delay`.
    fn slow_handshake(self, delay: Duration) -> Self {
        self.0.lock().unwrap().handshake_delay = delay;
        self
    }

    fn rejecting(self) -> Self {
        self.0.lock().unwrap().reject = true;
        self
    }

    fn stored(&self) -> Vec<Event> {
        self.0.lock().unwrap().events.clone()
    }

    fn reqs(&self) -> usize {
        self.0.lock().unwrap().reqs
    }

    /// Replies to one client frame.
    fn answer(&self, frame: &Value) -> Vec<Value> {
        let mut inner = self.0.lock().unwrap();
        match frame[0].as_str() {
            Some("REQ") => {
                inner.reqs += 1;
                let sub_id = frame[1].as_str().unwrap_or_default().to_string();
                let filter: Filter = serde_json::from_value(frame[2].clone()).unwrap_or_default();
                let mut replies: Vec<Value> = inner
                    .events
                    .iter()
                    .filter(|e| filter.matches(e))
                    .map(|e| json!(["EVENT", sub_id, e]))
                    .collect();
                if !inner.silent {
                    replies.push(json!(["EOSE", sub_id]));
                }
                replies
            }
            Some("EVENT") => {
                let Ok(event) = serde_json::from_value::<Event>(frame[1].clone()) else {
                    return vec![json!(["NOTICE", "bad event"])];
                };
                if inner.reject {
                    return vec![json!(["OK", event.id, false, "blocked: not on the list"])];
                }
                let id = event.id.clone();
                inner.events.push(event);
                vec![json!(["OK", id, true, ""])]
            }
            _ => Vec::new(),
        }
    }

    async fn spawn(self) -> RelayUrl {
        let app = Router::new().route("/", get(upgrade)).with_state(self);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        RelayUrl::from(format!("ws://{addr}"))
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(relay): State<FakeRelay>) -> Response {
    let delay = relay.0.lock().unwrap().handshake_delay;
    tokio::time::sleep(delay).await;
    ws.on_upgrade(move |socket| serve(socket, relay))
}

async fn serve(mut socket: WebSocket, relay: FakeRelay) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        for reply in relay.answer(&frame) {
            if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                return;
            }
        }
    }
}

const DEAD_RELAY: &str = "ws://127.0.0.1:9";

fn event(kind: u16, created_at: u64, content: &str) -> Event {
    let unsigned = UnsignedEvent::new("ab".repeat(32), created_at, kind)
        .with_tags(vec![tag(["t", "comic-chat"])])
        .with_content(content);
    Event {
        id: unsigned.compute_id().to_hex(),
        pubkey: unsigned.pubkey,
        created_at,
        kind,
        tags: unsigned.tags,
        content: unsigned.content,
        sig: "00".repeat(64),
    }
}

fn pool() -> WsRelayPool {
    WsRelayPool::new(Duration::from_secs(2))
}

#[tokio::test]
async fn query_merges_relays_and_skips_dead_ones() {
    let shared = event(Kind::CHANNEL_CREATE, 10, "shared");
    let a = FakeRelay::default()
        .with_event(shared.clone())
        .with_event(event(Kind::CHANNEL_CREATE, 11, "only a"))
        .with_event(event(Kind::CHANNEL_MESSAGE, 12, "wrong kind"))
        .spawn()
        .await;
    let b = FakeRelay::default().with_event(shared.clone()).spawn().await;

    let relays = vec![a, b, RelayUrl::from(DEAD_RELAY)];
    let filter = Filter::new().kind(Kind::CHANNEL_CREATE);
    let mut events = pool().query(&relays, &filter, None).await.unwrap();
    events.sort_by_key(|e| e.created_at);

    let contents: Vec<&str> = events.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["shared", "only a"]);
}

#[tokio::test]
async fn query_fails_when_every_relay_fails() {
    let err = pool()
        .query(&[RelayUrl::from(DEAD_RELAY)], &Filter::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::AllFailed(ref reasons) if reasons.len() == 1), "{err}");

    let err = pool().query(&[], &Filter::new(), None).await.unwrap_err();
    assert_eq!(err, RelayError::NoRelays);
}

#[tokio::test]
async fn forged_ids_are_dropped() {
    let mut forged = event(Kind::CHANNEL_CREATE, 10, "real");
    forged.content = "tampered".into();
    let relay = FakeRelay::default()
        .with_event(forged)
        .with_event(event(Kind::CHANNEL_CREATE, 11, "honest"))
        .spawn()
        .await;

    let events = pool().query(&[relay], &Filter::new(), None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].content, "honest");
}

#[tokio::test]
async fn max_wait_returns_what_arrived() {
    let relay = FakeRelay::default()
        .with_event(event(Kind::PUBLIC_CHATS, 10, ""))
        .silent();
    let url = relay.clone().spawn().await;

    let started = std::time::Instant::now();
    let events = pool()
        .query(&[url], &Filter::new(), Some(Duration::from_millis(300)))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(relay.reqs(), 1);
}

#[tokio::test]
async fn max_wait_starts_after_the_handshake() {
    let url = FakeRelay::default()
        .with_event(event(Kind::PUBLIC_CHATS, 10, ""))
        .slow_handshake(Duration::from_millis(1200))
        .spawn()
        .await;

    let events = WsRelayPool::new(Duration::from_secs(5))
        .query(&[url], &Filter::new().kind(Kind::PUBLIC_CHATS), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn silence_until_max_wait_is_a_failure() {
    let url = FakeRelay::default().silent().spawn().await;

    let err = pool()
        .query(&[url.clone()], &Filter::new(), Some(Duration::from_millis(300)))
        .await
        .unwrap_err();
    let RelayError::AllFailed(reasons) = err else {
        panic!("expected AllFailed, got {err:?}");
    };
    assert_eq!(reasons, vec![RelayError::Timeout(url).to_string()]);
}

#[tokio::test]
async fn get_returns_newest() {
    let relay = FakeRelay::default()
        .with_event(event(Kind::RELAY_LIST, 10, "old"))
        .with_event(event(Kind::RELAY_LIST, 30, "new"))
        .with_event(event(Kind::RELAY_LIST, 20, "middle"))
        .spawn()
        .await;
    let newest = pool()
        .get(&[relay], &Filter::new().kind(Kind::RELAY_LIST))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newest.content, "new");
}

#[tokio::test]
async fn subscription_dedupes_then_signals_eose() {
    let shared = event(Kind::CHANNEL_CREATE, 10, "shared");
    let a = FakeRelay::default().with_event(shared.clone()).spawn().await;
    let b = FakeRelay::default()
        .with_event(shared.clone())
        .with_event(event(Kind::CHANNEL_METADATA, 11, "update"))
        .spawn()
        .await;

    let filter = Filter::new().kind(Kind::CHANNEL_CREATE).kind(Kind::CHANNEL_METADATA);
    let subscription = pool().subscribe(&[a, b], &filter).await.unwrap();
    let mut events = subscription.until_eose().await.unwrap();
    events.sort_by_key(|e| e.created_at);
    let contents: Vec<&str> = events.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["shared", "update"]);
}

#[tokio::test]
async fn subscription_survives_a_dead_relay_and_times_out_silent_ones() {
    let silent = FakeRelay::default()
        .with_event(event(Kind::CHANNEL_CREATE, 10, "from silent"))
        .silent()
        .spawn()
        .await;
    let pool = WsRelayPool::new(Duration::from_millis(500));
    let mut subscription = pool
        .subscribe(&[silent, RelayUrl::from(DEAD_RELAY)], &Filter::new())
        .await
        .unwrap();

    let mut saw_event = false;
    loop {
        match subscription.next().await {
            Some(SubscriptionItem::Event(e)) => {
                assert_eq!(e.content, "from silent");
                saw_event = true;
            }
            Some(SubscriptionItem::Eose) => break,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(saw_event);
}

#[tokio::test]
async fn subscription_closes_when_no_relay_is_reachable() {
    let mut subscription = pool()
        .subscribe(&[RelayUrl::from(DEAD_RELAY)], &Filter::new())
        .await
        .unwrap();
    assert!(matches!(subscription.next().await, Some(SubscriptionItem::Closed(_))));
}

#[tokio::test]
async fn publish_reports_each_relay() {
    let accepting = FakeRelay::default();
    let accepting_url = accepting.clone().spawn().await;
    let rejecting_url = FakeRelay::default().rejecting().spawn().await;

    let note = event(Kind::PUBLIC_CHATS, 5, "");
    let outcomes = pool()
        .publish(
            &[accepting_url.clone(), rejecting_url.clone(), RelayUrl::from(DEAD_RELAY)],
            &note,
        )
        .await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].relay, accepting_url);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(
        &outcomes[1].result,
        Err(RelayError::Rejected { reason, .. }) if reason.starts_with("blocked")
    ));
    assert!(outcomes[2].result.is_err());
    assert_eq!(accepting.stored(), vec![note]);
}
