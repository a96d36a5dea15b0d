//! NIP-01 wire messages.

use comic_core::Event;
use serde_json::{Value, json};

use crate::filter::Filter;

/// Client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage<'a> {
    Req { sub_id: &'a str, filter: &'a Filter },
    Close { sub_id: &'a str },
    Event(&'a Event),
}

impl ClientMessage<'_> {
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Req { sub_id, filter } => json!(["REQ", sub_id, filter]),
            ClientMessage::Close { sub_id } => json!(["CLOSE", sub_id]),
            ClientMessage::Event(event) => json!(["EVENT", event]),
        }
        .to_string()
    }
}

/// Relay to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Event { sub_id: String, event: Event },
    Eose { sub_id: String },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Closed { sub_id: String, message: String },
    Notice(String),
}

impl RelayMessage {
    /// `None` for anything that is not a well-formed NIP-01 message.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let parts = value.as_array()?;
        let str_at = |i: usize| parts.get(i).and_then(Value::as_str).map(str::to_string);

        match parts.first()?.as_str()? {
            "EVENT" => Some(RelayMessage::Event {
                sub_id: str_at(1)?,
                event: serde_json::from_value(parts.get(2)?.clone()).ok()?,
            }),
            "EOSE" => Some(RelayMessage::Eose { sub_id: str_at(1)? }),
            "OK" => Some(RelayMessage::Ok {
                event_id: str_at(1)?,
                accepted: parts.get(2)?.as_bool()?,
                message: str_at(3).unwrap_or_default(),
            }),
            "CLOSED" => Some(RelayMessage::Closed {
                sub_id: str_at(1)?,
                message: str_at(2).unwrap_or_default(),
            }),
            "NOTICE" => Some(RelayMessage::Notice(str_at(1).unwrap_or_default())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages() {
        let filter = Filter::new().kind(40);
        assert_eq!(
            ClientMessage::Req {
                sub_id: "s1",
                filter: &filter
            }
            .to_json(),
            r#"["REQ","s1",{"kinds":[40]}]"#
        );
        assert_eq!(ClientMessage::Close { sub_id: "s1" }.to_json(), r#"["CLOSE","s1"]"#);
    }

    #[test]
    fn relay_messages() {
        let event = r#"{"id":"a","pubkey":"p","created_at":1,"kind":40,"tags":[],"content":"{}","sig":"s"}"#;
        let parsed = RelayMessage::parse(&format!(r#"["EVENT","s1",{event}]"#)).unwrap();
        let RelayMessage::Event { sub_id, event } = parsed else {
            panic!("not an event");
        };
        assert_eq!(sub_id, "s1");
        assert_eq!(event.kind, 40);

        assert_eq!(
            RelayMessage::parse(r#"["EOSE","s1"]"#),
            Some(RelayMessage::Eose { sub_id: "s1".into() })
        );
        assert_eq!(
            RelayMessage::parse(r#"["OK","a",false,"blocked: spam"]"#),
            Some(RelayMessage::Ok {
                event_id: "a".into(),
                accepted: false,
                message: "blocked: spam".into(),
            })
        );
        assert_eq!(RelayMessage::parse(r#"["AUTH","x"]"#), None);
        assert_eq!(RelayMessage::parse("not json"), None);
    }
}
