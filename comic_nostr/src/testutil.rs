//! In-memory [`RelayPool`] for tests of code built on top of relays.
//!
//! ```toml
//! [dev-dependencies]
//! comic_nostr = { workspace = true, features = ["testutil"] }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use comic_core::{Event, RelayUrl};
use tokio::sync::mpsc;

use crate::filter::Filter;
use crate::pool::{PublishOutcome, RelayError, RelayPool, Subscription, SubscriptionItem, dedupe_by_id};

#[derive(Debug, Default)]
struct Inner {
    events: HashMap<RelayUrl, Vec<Event>>,
    offline: HashSet<RelayUrl>,
    rejecting: HashSet<RelayUrl>,
    close_subscriptions: bool,
    queries: usize,
}

/// Relays as plain event lists. Relays nobody wrote to answer with nothing.
#[derive(Debug, Default)]
pub struct MemoryRelayPool {
    inner: Mutex<Inner>,
}

impl MemoryRelayPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_event(self, relay: impl Into<RelayUrl>, event: Event) -> Self {
        self.add_event(relay, event);
        self
    }

    pub fn add_event(&self, relay: impl Into<RelayUrl>, event: Event) {
        self.lock().events.entry(relay.into()).or_default().push(event);
    }

    /// Connections to `relay` fail from now on.
    pub fn set_offline(&self, relay: impl Into<RelayUrl>) {
        self.lock().offline.insert(relay.into());
    }

    /// `relay` answers every publish with `OK false`.
    pub fn set_rejecting(&self, relay: impl Into<RelayUrl>) {
        self.lock().rejecting.insert(relay.into());
    }

    /// Subscriptions end with `CLOSED` instead of `EOSE`.
    pub fn close_subscriptions(&self) {
        self.lock().close_subscriptions = true;
    }

    /// Events stored on `relay`, in arrival order.
    pub fn events(&self, relay: &RelayUrl) -> Vec<Event> {
        self.lock().events.get(relay).cloned().unwrap_or_default()
    }

    /// Number of `query` calls so far.
    pub fn queries(&self) -> usize {
        self.lock().queries
    }

    fn matching(&self, relays: &[RelayUrl], filter: &Filter) -> (Vec<Event>, Vec<String>) {
        let inner = self.lock();
        let mut events = Vec::new();
        let mut failures = Vec::new();
        for relay in relays {
            if inner.offline.contains(relay) {
                failures.push(format!("{relay} is offline"));
                continue;
            }
            let mut found: Vec<Event> = inner
                .events
                .get(relay)
                .into_iter()
                .flatten()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = filter.limit {
                found.truncate(limit);
            }
            events.extend(found);
        }
        (dedupe_by_id(events), failures)
    }
}

#[async_trait::async_trait]
impl RelayPool for MemoryRelayPool {
    async fn query(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        _max_wait: Option<Duration>,
    ) -> Result<Vec<Event>, RelayError> {
        if relays.is_empty() {
            return Err(RelayError::NoRelays);
        }
        self.lock().queries += 1;
        let (events, failures) = self.matching(relays, filter);
        if failures.len() == relays.len() {
            return Err(RelayError::AllFailed(failures));
        }
        Ok(events)
    }

    async fn subscribe(&self, relays: &[RelayUrl], filter: &Filter) -> Result<Subscription, RelayError> {
        if relays.is_empty() {
            return Err(RelayError::NoRelays);
        }
        let (events, failures) = self.matching(relays, filter);
        let closing = self.lock().close_subscriptions || failures.len() == relays.len();

        let (tx, rx) = mpsc::channel(events.len() + 1);
        for event in events {
            let _ = tx.try_send(SubscriptionItem::Event(event));
        }
        let last = if closing {
            SubscriptionItem::Closed("closed by relay".into())
        } else {
            SubscriptionItem::Eose
        };
        let _ = tx.try_send(last);
        Ok(Subscription::new(rx, Vec::new()))
    }

    async fn publish(&self, relays: &[RelayUrl], event: &Event) -> Vec<PublishOutcome> {
        let mut inner = self.lock();
        relays
            .iter()
            .map(|relay| {
                let result = if inner.offline.contains(relay) {
                    Err(RelayError::Connect {
                        relay: relay.clone(),
                        reason: "offline".into(),
                    })
                } else if inner.rejecting.contains(relay) {
                    Err(RelayError::Rejected {
                        relay: relay.clone(),
                        reason: "blocked: test relay".into(),
                    })
                } else {
                    inner.events.entry(relay.clone()).or_default().push(event.clone());
                    Ok(())
                };
                PublishOutcome {
                    relay: relay.clone(),
                    result,
                }
            })
            .collect()
    }
}
