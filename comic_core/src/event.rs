//! Nostr events in their NIP-01 JSON shape.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::hash::Sha256Hash;

/// Event kinds read and written by the comic clients.
pub struct Kind;

impl Kind {
    pub const METADATA: u16 = 0;
    pub const CHANNEL_CREATE: u16 = 40;
    pub const CHANNEL_METADATA: u16 = 41;
    pub const CHANNEL_MESSAGE: u16 = 42;
    pub const RELAY_LIST: u16 = 10002;
    pub const PUBLIC_CHATS: u16 = 10005;
    pub const BLOSSOM_SERVER_LIST: u16 = 10063;
    pub const BLOSSOM_AUTH: u16 = 24242;
    pub const BLOSSOM_DRIVE: u16 = 30563;
}

pub type Tag = Vec<String>;

/// An event before the signer has filled in `id` and `sig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
}

/// A signed event as received from a relay or returned by a signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

/// Builds a tag from anything string-like.
pub fn tag<I, S>(parts: I) -> Tag
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

fn compute_id(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Tag],
    content: &str,
) -> Sha256Hash {
    let canonical = json!([0, pubkey, created_at, kind, tags, content]);
    Sha256Hash::new(canonical.to_string())
}

impl UnsignedEvent {
    pub fn new(pubkey: impl Into<String>, created_at: u64, kind: u16) -> Self {
        Self {
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags: Vec::new(),
            content: String::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// NIP-01 event id: sha256 over `[0, pubkey, created_at, kind, tags, content]`.
    pub fn compute_id(&self) -> Sha256Hash {
        compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }
}

impl Event {
    pub fn compute_id(&self) -> Sha256Hash {
        compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// True when `id` matches the serialized fields. Signatures are the
    /// signer's and the relay's business and are not checked here.
    pub fn verify_id(&self) -> bool {
        self.compute_id().to_hex() == self.id.to_ascii_lowercase()
    }

    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// All tags named `name`, in event order.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
    }

    /// Second element of every tag named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags_named(name)
            .filter_map(|t| t.get(1))
            .map(String::as_str)
    }

    pub fn unsigned(&self) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}

/// Keeps the event with the greatest `created_at`; the first seen wins ties.
pub fn latest(events: impl IntoIterator<Item = Event>) -> Option<Event> {
    events.into_iter().fold(None, |best, event| match best {
        Some(b) if b.created_at >= event.created_at => Some(b),
        _ => Some(event),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Event {
        let unsigned = UnsignedEvent::new("ab".repeat(32), 1_700_000_000, 1)
            .with_tags(vec![tag(["t", "comic-chat"])])
            .with_content("hello\n\"world\"");
        Event {
            id: unsigned.compute_id().to_hex(),
            pubkey: unsigned.pubkey.clone(),
            created_at: unsigned.created_at,
            kind: unsigned.kind,
            tags: unsigned.tags.clone(),
            content: unsigned.content.clone(),
            sig: String::new(),
        }
    }

    #[test]
    fn id_matches_canonical_serialization() {
        let event = sample();
        let expected = Sha256Hash::new(format!(
            "[0,\"{}\",1700000000,1,[[\"t\",\"comic-chat\"]],\"hello\\n\\\"world\\\"\"]",
            "ab".repeat(32)
        ));
        assert_eq!(event.compute_id(), expected);
        assert!(event.verify_id());
    }

    #[test]
    fn tampered_content_fails_id_check() {
        let mut event = sample();
        event.content.push('!');
        assert!(!event.verify_id());
    }

    #[test]
    fn tag_accessors() {
        let mut event = sample();
        event.tags = vec![
            tag(["server", "https://a"]),
            tag(["d", "drive"]),
            tag(["server", "https://b"]),
            tag(["empty"]),
        ];
        assert_eq!(event.tag_value("d"), Some("drive"));
        assert_eq!(event.tag_value("empty"), None);
        assert_eq!(
            event.tag_values("server").collect::<Vec<_>>(),
            vec!["https://a", "https://b"]
        );
    }

    #[test]
    fn latest_prefers_newest_then_first() {
        let mut a = sample();
        a.id = "a".into();
        let mut b = sample();
        b.id = "b".into();
        let mut c = sample();
        c.id = "c".into();
        c.created_at += 10;

        assert_eq!(latest(vec![a.clone(), b.clone()]).unwrap().id, "a");
        assert_eq!(latest(vec![a, c, b]).unwrap().id, "c");
        assert!(latest(Vec::new()).is_none());
    }
}
