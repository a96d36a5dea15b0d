use comic_core::Event;
use serde::{Deserialize, Serialize};

/// NIP-01 subscription filter. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
    #[serde(rename = "#e", default, skip_serializing_if = "Vec::is_empty")]
    pub e: Vec<String>,
    #[serde(rename = "#d", default, skip_serializing_if = "Vec::is_empty")]
    pub d: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.push(pubkey.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn event_ref(mut self, id: impl Into<String>) -> Self {
        self.e.push(id.into());
        self
    }

    pub fn identifier(mut self, d: impl Into<String>) -> Self {
        self.d.push(d.into());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` passes every condition except `limit`.
    pub fn matches(&self, event: &Event) -> bool {
        let tag_matches = |name: &str, wanted: &[String]| {
            wanted.is_empty() || event.tag_values(name).any(|v| wanted.iter().any(|w| w == v))
        };

        (self.ids.is_empty() || self.ids.contains(&event.id))
            && (self.authors.is_empty() || self.authors.contains(&event.pubkey))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && tag_matches("e", &self.e)
            && tag_matches("d", &self.d)
            && self.since.is_none_or(|since| event.created_at >= since)
            && self.until.is_none_or(|until| event.created_at <= until)
    }
}
