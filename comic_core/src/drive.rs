use serde::{Deserialize, Serialize};

use crate::event::{Event, Kind, Tag, UnsignedEvent, tag};
use crate::types::Server;

/// A blob reference inside a drive (`["x", sha256, path, size, mime]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveEntry {
    pub sha256: String,
    pub path: String,
    pub size: u64,
    pub mime: String,
}

/// Keywords that select one of the character's emotion assets
/// (`["emotion", name, keyword...]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emotion {
    pub name: String,
    pub keywords: Vec<String>,
}

/// A user-published drive (kind 30563).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Drive {
    /// Id of the event this drive was parsed from; empty for local drafts.
    pub id: String,
    pub name: String,
    pub description: String,
    pub servers: Vec<Server>,
    /// The `d` identifier that makes the event addressable.
    pub d: String,
    pub folders: Vec<String>,
    pub x: Vec<DriveEntry>,
    pub emotions: Vec<Emotion>,
}

impl Drive {
    pub fn from_event(event: &Event) -> Self {
        let text = |name: &str| event.tag_value(name).unwrap_or_default().to_string();

        let x = event
            .tags_named("x")
            .map(|t| {
                let part = |i: usize| t.get(i).cloned().unwrap_or_default();
                DriveEntry {
                    sha256: part(1),
                    path: part(2),
                    size: t.get(3).and_then(|s| s.parse().ok()).unwrap_or(0),
                    mime: part(4),
                }
            })
            .collect();

        let emotions = event
            .tags_named("emotion")
            .map(|t| Emotion {
                name: t.get(1).cloned().unwrap_or_default(),
                keywords: t.iter().skip(2).cloned().collect(),
            })
            .collect();

        Drive {
            id: event.id.clone(),
            name: text("name"),
            description: text("description"),
            d: text("d"),
            servers: event.tag_values("server").map(Server::from).collect(),
            folders: event.tag_values("folder").map(str::to_string).collect(),
            x,
            emotions,
        }
    }

    /// Tags for publishing. `servers` are the servers currently selected by
    /// the user, which replace the drive's own list.
    pub fn to_tags(&self, servers: &[Server]) -> Vec<Tag> {
        let mut tags = vec![
            tag(["name", self.name.as_str()]),
            tag(["description", self.description.as_str()]),
            tag(["d", self.d.as_str()]),
        ];
        tags.extend(servers.iter().map(|s| tag(["server", s.as_str()])));
        tags.extend(self.folders.iter().map(|f| tag(["folder", f.as_str()])));
        tags.extend(self.x.iter().map(|x| {
            vec![
                "x".to_string(),
                x.sha256.clone(),
                x.path.clone(),
                x.size.to_string(),
                x.mime.clone(),
            ]
        }));
        tags.extend(self.emotions.iter().map(|e| {
            let mut t = vec!["emotion".to_string(), e.name.clone()];
            t.extend(e.keywords.iter().cloned());
            t
        }));
        tags
    }

    pub fn to_unsigned_event(
        &self,
        pubkey: &str,
        servers: &[Server],
        created_at: u64,
    ) -> UnsignedEvent {
        UnsignedEvent::new(pubkey, created_at, Kind::BLOSSOM_DRIVE).with_tags(self.to_tags(servers))
    }

    pub fn entry_by_path(&self, path: &str) -> Option<&DriveEntry> {
        self.x.iter().find(|x| x.path == path)
    }

    /// Sorts entries by path, the order every edit leaves them in.
    pub fn sort_entries(&mut self) {
        self.x.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_event() -> Event {
        Event {
            id: "e1".into(),
            pubkey: "pk".into(),
            created_at: 10,
            kind: Kind::BLOSSOM_DRIVE,
            tags: vec![
                tag(["name", "Alice"]),
                tag(["description", "main character"]),
                tag(["d", "alice"]),
                tag(["server", "https://a.example/"]),
                tag(["folder", "/poses"]),
                tag(["x", "aa", "/happy.svg", "120", "image/svg+xml"]),
                tag(["x", "bb", "/poses/sad.svg", "oops", "image/svg+xml"]),
                tag(["emotion", "happy", ":)", "ahah"]),
            ],
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn parses_all_tag_groups() {
        let drive = Drive::from_event(&drive_event());
        assert_eq!(drive.id, "e1");
        assert_eq!(drive.name, "Alice");
        assert_eq!(drive.d, "alice");
        assert_eq!(drive.servers, vec![Server::new("https://a.example/")]);
        assert_eq!(drive.folders, vec!["/poses".to_string()]);
        assert_eq!(drive.x.len(), 2);
        assert_eq!(drive.x[0].size, 120);
        assert_eq!(drive.x[1].size, 0, "unparseable size falls back to 0");
        assert_eq!(
            drive.emotions,
            vec![Emotion {
                name: "happy".into(),
                keywords: vec![":)".into(), "ahah".into()],
            }]
        );
    }

    #[test]
    fn missing_text_tags_default_to_empty() {
        let mut event = drive_event();
        event.tags.retain(|t| t[0] != "description");
        let drive = Drive::from_event(&event);
        assert_eq!(drive.description, "");
    }

    #[test]
    fn publishing_uses_selected_servers_in_tag_order() {
        let drive = Drive::from_event(&drive_event());
        let selected = vec![Server::new("https://b.example")];
        let unsigned = drive.to_unsigned_event("pk", &selected, 99);

        assert_eq!(unsigned.kind, Kind::BLOSSOM_DRIVE);
        assert_eq!(unsigned.content, "");
        let names: Vec<&str> = unsigned.tags.iter().map(|t| t[0].as_str()).collect();
        assert_eq!(
            names,
            vec!["name", "description", "d", "server", "folder", "x", "x", "emotion"]
        );
        assert_eq!(unsigned.tags[3], tag(["server", "https://b.example"]));
        assert_eq!(
            unsigned.tags[6],
            tag(["x", "bb", "/poses/sad.svg", "0", "image/svg+xml"])
        );
    }
}
