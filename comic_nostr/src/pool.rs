//! Relay access behind a trait, so services can run against real relays or
//! an in-memory pool.

use comic_core::{Event, RelayUrl};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::filter::Filter;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("no relays given")]
    NoRelays,
    #[error("could not connect to {relay}: {reason}")]
    Connect { relay: RelayUrl, reason: String },
    #[error("{0} timed out")]
    Timeout(RelayUrl),
    #[error("{relay} rejected the event: {reason}")]
    Rejected { relay: RelayUrl, reason: String },
    #[error("subscription closed: {0}")]
    Closed(String),
    #[error("every relay failed: {}", .0.join(", "))]
    AllFailed(Vec<String>),
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionItem {
    Event(Event),
    /// All relays have sent their stored events.
    Eose,
    /// Every relay closed the subscription.
    Closed(String),
}

/// A live subscription across several relays. Dropping it closes the
/// underlying connections.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<SubscriptionItem>,
    tasks: Vec<AbortHandle>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<SubscriptionItem>, tasks: Vec<AbortHandle>) -> Self {
        Self { rx, tasks }
    }

    /// `None` once every relay is gone.
    pub async fn next(&mut self) -> Option<SubscriptionItem> {
        self.rx.recv().await
    }

    /// Stored events up to EOSE, deduplicated by id.
    pub async fn until_eose(mut self) -> Result<Vec<Event>, RelayError> {
        let mut seen = HashSet::new();
        let mut events = Vec::new();
        loop {
            match self.next().await {
                Some(SubscriptionItem::Event(event)) => {
                    if seen.insert(event.id.clone()) {
                        events.push(event);
                    }
                }
                Some(SubscriptionItem::Eose) => return Ok(events),
                Some(SubscriptionItem::Closed(reason)) => return Err(RelayError::Closed(reason)),
                None => return Err(RelayError::Closed("connection lost".into())),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Per-relay result of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub relay: RelayUrl,
    pub result: Result<(), RelayError>,
}

#[async_trait::async_trait]
pub trait RelayPool: Send + Sync {
    /// Stored events matching `filter` from all `relays`, deduplicated by id.
    /// `max_wait` starts once a relay is connected. A relay that has not
    /// finished by then contributes what it sent so far, and counts as
    /// failed when it sent nothing.
    async fn query(
        &self,
        relays: &[RelayUrl],
        filter: &Filter,
        max_wait: Option<Duration>,
    ) -> Result<Vec<Event>, RelayError>;

    /// The newest matching event.
    async fn get(&self, relays: &[RelayUrl], filter: &Filter) -> Result<Option<Event>, RelayError> {
        let events = self.query(relays, filter, None).await?;
        Ok(comic_core::event::latest(events))
    }

    async fn subscribe(&self, relays: &[RelayUrl], filter: &Filter) -> Result<Subscription, RelayError>;

    async fn publish(&self, relays: &[RelayUrl], event: &Event) -> Vec<PublishOutcome>;
}

/// Removes duplicate ids, keeping the first occurrence.
pub fn dedupe_by_id(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}

/// Publishes through `pool` and succeeds when at least one relay accepted.
pub async fn publish_to_any<P: RelayPool + ?Sized>(
    pool: &P,
    relays: &[RelayUrl],
    event: &Event,
) -> Result<Vec<PublishOutcome>, RelayError> {
    if relays.is_empty() {
        return Err(RelayError::NoRelays);
    }
    let outcomes = pool.publish(relays, event).await;
    if outcomes.iter().any(|o| o.result.is_ok()) {
        return Ok(outcomes);
    }
    Err(RelayError::AllFailed(
        outcomes
            .into_iter()
            .filter_map(|o| o.result.err())
            .map(|err| err.to_string())
            .collect(),
    ))
}
