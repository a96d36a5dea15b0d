//! Public chat channels (NIP-28): discovery, pinning, creation, updates and
//! messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use comic_core::event::{Tag, tag};
use comic_core::{Event, Kind, RelayUrl, Signer, UnsignedEvent, sign_checked, unix_now};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NostrError;
use crate::filter::Filter;
use crate::pool::{RelayError, RelayPool, SubscriptionItem, publish_to_any};

/// `t` tag value marking channels created by the comic client.
pub const COMIC_CHAT_TAG: &str = "comic-chat";

pub const PINNED_CHANNELS_MAX_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("channel content is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("channel content is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    /// Id of the kind 40 event.
    pub id: String,
    pub name: String,
    pub about: String,
    pub picture: String,
    pub relays: Vec<RelayUrl>,
    pub owner: String,
    pub created_at: u64,
    pub tags: Vec<Tag>,
    /// `created_at` of the applied kind 41, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    pub is_user_created: bool,
}

impl ChannelMetadata {
    pub fn is_comic_chat(&self) -> bool {
        self.tags
            .iter()
            .any(|t| t.first().map(String::as_str) == Some("t") && t.get(1).map(String::as_str) == Some(COMIC_CHAT_TAG))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelWithPinned {
    pub channel: ChannelMetadata,
    pub pinned: bool,
}

/// Content of kind 40 and 41 events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContent {
    pub name: String,
    pub about: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub relays: Vec<RelayUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub pubkey: String,
    pub content: String,
    pub created_at: u64,
}

impl From<Event> for ChatMessage {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            pubkey: event.pubkey,
            content: event.content,
            created_at: event.created_at,
        }
    }
}

/// Builds channel metadata from a kind 40 and optionally the kind 41 that
/// updates it. Content fields are read leniently: missing or mistyped
/// fields become empty.
pub fn parse_channel_event(
    create: &Event,
    user_pubkey: &str,
    update: Option<&Event>,
) -> Result<ChannelMetadata, ParseError> {
    let mut content: Value = serde_json::from_str(&create.content)?;
    if let Some(update) = update {
        content = serde_json::from_str(&update.content)?;
    }
    let fields = content.as_object().ok_or(ParseError::NotAnObject)?;
    let text = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let relays = fields
        .get("relays")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).map(RelayUrl::from).collect())
        .unwrap_or_default();

    Ok(ChannelMetadata {
        id: create.id.clone(),
        name: text("name"),
        about: text("about"),
        picture: text("picture"),
        relays,
        owner: create.pubkey.clone(),
        created_at: create.created_at,
        tags: update.unwrap_or(create).tags.clone(),
        updated_at: update.map(|u| u.created_at),
        is_user_created: create.pubkey == user_pubkey,
    })
}

/// Pairs kind 40 creations with kind 41 updates as they stream in, in any
/// order. An update only applies when its author created the channel; the
/// newest applicable update wins.
#[derive(Debug, Default)]
struct ChannelReconciler {
    creates: HashMap<String, Event>,
    order: Vec<String>,
    updates: HashMap<String, Event>,
    /// Updates whose creation has not arrived yet.
    pending: HashMap<String, Vec<Event>>,
}

impl ChannelReconciler {
    fn add(&mut self, event: Event) {
        match event.kind {
            Kind::CHANNEL_CREATE => self.add_create(event),
            Kind::CHANNEL_METADATA => self.add_update(event),
            _ => {}
        }
    }

    fn add_create(&mut self, create: Event) {
        if self.creates.contains_key(&create.id) {
            return;
        }
        if let Some(waiting) = self.pending.remove(&create.id) {
            let newest = waiting
                .into_iter()
                .filter(|u| u.pubkey == create.pubkey)
                .fold(None::<Event>, |best, u| match best {
                    Some(b) if b.created_at >= u.created_at => Some(b),
                    _ => Some(u),
                });
            if let Some(update) = newest {
                self.updates.insert(create.id.clone(), update);
            }
        }
        self.order.push(create.id.clone());
        self.creates.insert(create.id.clone(), create);
    }

    fn add_update(&mut self, update: Event) {
        let Some(channel_id) = update.tag_value("e").map(str::to_string) else {
            return;
        };
        let Some(create) = self.creates.get(&channel_id) else {
            self.pending.entry(channel_id).or_default().push(update);
            return;
        };
        if create.pubkey != update.pubkey {
            return;
        }
        let newer = self
            .updates
            .get(&channel_id)
            .is_none_or(|current| current.created_at < update.created_at);
        if newer {
            self.updates.insert(channel_id, update);
        }
    }

    fn finish(self, user_pubkey: &str) -> Vec<ChannelMetadata> {
        self.order
            .iter()
            .filter_map(|id| {
                let create = self.creates.get(id)?;
                let update = self.updates.get(id);
                match parse_channel_event(create, user_pubkey, update) {
                    Ok(channel) => Some(channel),
                    Err(err) => {
                        match update {
                            Some(update) => tracing::error!(
                                "error parsing channel metadata: create: {}, update: {}: {err}",
                                create.id,
                                update.id
                            ),
                            None => tracing::error!("error parsing channel metadata: create: {}: {err}", create.id),
                        }
                        None
                    }
                }
            })
            .collect()
    }
}

/// Channel reads and writes for one signer.
pub struct ChannelClient {
    pool: Arc<dyn RelayPool>,
    signer: Arc<dyn Signer>,
    version: String,
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient").field("version", &self.version).finish()
    }
}

impl ChannelClient {
    /// `version` goes into the `t` tag of channels this client creates.
    pub fn new(pool: Arc<dyn RelayPool>, signer: Arc<dyn Signer>, version: impl Into<String>) -> Self {
        Self {
            pool,
            signer,
            version: version.into(),
        }
    }

    fn comic_tag(&self) -> Tag {
        tag(["t".to_string(), COMIC_CHAT_TAG.to_string(), format!("v{}", self.version)])
    }

    /// Channel ids from the newest kind 10005 list of `pubkey`.
    pub async fn fetch_pinned_channels(&self, relays: &[RelayUrl], pubkey: &str) -> Result<Vec<String>, NostrError> {
        let filter = Filter::new().kind(Kind::PUBLIC_CHATS).author(pubkey);
        let events = self.pool.query(relays, &filter, Some(PINNED_CHANNELS_MAX_WAIT)).await?;
        Ok(comic_core::event::latest(events)
            .map(|list| list.tag_values("e").map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Every channel the relays know about, with updates applied. Waits for
    /// the relays' stored events only.
    pub async fn fetch_channel_metadata(
        &self,
        relays: &[RelayUrl],
        user_pubkey: &str,
    ) -> Result<Vec<ChannelMetadata>, NostrError> {
        let filter = Filter::new().kind(Kind::CHANNEL_CREATE).kind(Kind::CHANNEL_METADATA);
        let mut subscription = self.pool.subscribe(relays, &filter).await?;
        let mut reconciler = ChannelReconciler::default();

        loop {
            match subscription.next().await {
                Some(SubscriptionItem::Event(event)) => reconciler.add(event),
                Some(SubscriptionItem::Eose) => break,
                Some(SubscriptionItem::Closed(reason)) => {
                    tracing::warn!("channel subscription closed: {reason}");
                    return Err(RelayError::Closed(reason).into());
                }
                None => return Err(RelayError::Closed("connection lost".into()).into()),
            }
        }
        Ok(reconciler.finish(user_pubkey))
    }

    /// Replaces the pinned list of `pubkey` with `channel_ids`.
    pub async fn update_pinned_channels(
        &self,
        relays: &[RelayUrl],
        pubkey: &str,
        channel_ids: &[String],
    ) -> Result<Event, NostrError> {
        tracing::info!("updating pinned channels: {channel_ids:?}");
        let unsigned = UnsignedEvent::new(pubkey, unix_now(), Kind::PUBLIC_CHATS)
            .with_tags(channel_ids.iter().map(|id| tag(["e", id.as_str()])).collect());
        self.sign_and_publish(unsigned, relays).await
    }

    /// Creates a channel and returns its id.
    pub async fn create_channel(&self, relays: &[RelayUrl], content: &ChannelContent) -> Result<String, NostrError> {
        tracing::info!("creating channel: {}", content.name);
        let pubkey = self.signer.get_public_key().await?;
        let unsigned = UnsignedEvent::new(pubkey, unix_now(), Kind::CHANNEL_CREATE)
            .with_tags(vec![self.comic_tag()])
            .with_content(serde_json::to_string(content)?);
        Ok(self.sign_and_publish(unsigned, relays).await?.id)
    }

    /// Publishes new metadata for `channel_id` and returns the update's id.
    pub async fn update_channel(
        &self,
        relays: &[RelayUrl],
        channel_id: &str,
        content: &ChannelContent,
    ) -> Result<String, NostrError> {
        tracing::info!("updating channel: {channel_id} {}", content.name);
        let pubkey = self.signer.get_public_key().await?;
        let unsigned = UnsignedEvent::new(pubkey, unix_now(), Kind::CHANNEL_METADATA)
            .with_tags(vec![tag(["e", channel_id]), self.comic_tag()])
            .with_content(serde_json::to_string(content)?);
        Ok(self.sign_and_publish(unsigned, relays).await?.id)
    }

    /// Posts a kind 42 message into `channel_id`.
    pub async fn send_message(
        &self,
        channel_id: &str,
        relays: &[RelayUrl],
        content: &str,
    ) -> Result<ChatMessage, NostrError> {
        let pubkey = self.signer.get_public_key().await?;
        let hint = relays.first().map(RelayUrl::as_str).unwrap_or_default();
        let unsigned = UnsignedEvent::new(pubkey, unix_now(), Kind::CHANNEL_MESSAGE)
            .with_tags(vec![tag(["e", channel_id, hint, "root"])])
            .with_content(content);
        Ok(self.sign_and_publish(unsigned, relays).await?.into())
    }

    /// The newest `limit` messages of `channel_id`, oldest first.
    pub async fn fetch_messages(
        &self,
        channel_id: &str,
        relays: &[RelayUrl],
        limit: usize,
    ) -> Result<Vec<ChatMessage>, NostrError> {
        let filter = Filter::new()
            .kind(Kind::CHANNEL_MESSAGE)
            .event_ref(channel_id)
            .limit(limit);
        let mut events = self.pool.query(relays, &filter, None).await?;
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let excess = events.len().saturating_sub(limit);
        events.drain(..excess);
        Ok(events.into_iter().map(ChatMessage::from).collect())
    }

    async fn sign_and_publish(&self, unsigned: UnsignedEvent, relays: &[RelayUrl]) -> Result<Event, NostrError> {
        let event = sign_checked(self.signer.as_ref(), unsigned).await?;
        publish_to_any(self.pool.as_ref(), relays, &event).await?;
        Ok(event)
    }
}

/// Channel list filters: comic rooms only, own channels only, free text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelQuery {
    pub comic_only: bool,
    pub mine_only: bool,
    pub search: Option<String>,
}

impl ChannelQuery {
    /// Search matches a case-insensitive substring of the name, the about
    /// text or any tag element, or the exact channel id.
    pub fn matches(&self, channel: &ChannelMetadata) -> bool {
        if self.comic_only && !channel.is_comic_chat() {
            return false;
        }
        if self.mine_only && !channel.is_user_created {
            return false;
        }
        let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) else {
            return true;
        };
        let query = search.to_lowercase();
        channel.name.to_lowercase().contains(&query)
            || channel.about.to_lowercase().contains(&query)
            || channel
                .tags
                .iter()
                .flatten()
                .any(|t| t.to_lowercase().contains(&query))
            || channel.id == query
    }

    pub fn apply(&self, channels: Vec<ChannelWithPinned>) -> Vec<ChannelWithPinned> {
        channels.into_iter().filter(|c| self.matches(&c.channel)).collect()
    }
}
