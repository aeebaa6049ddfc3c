//! Wire format for the live feed
//!
//! All frames are JSON text messages tagged by a `type` field.
//!
//! Client to server:
//!
//! ```text
//! {"type":"set_watch","items":["event-42","event-43"]}
//! {"type":"add_watch","item":"event-42"}
//! {"type":"remove_watch","item":"event-42"}
//! {"type":"subscribe","series":"auto21"}
//! {"type":"unsubscribe","series":"auto21"}
//! {"type":"ping"}
//! ```
//!
//! Server to client: `welcome`, `watching`, `subscribed`, `pong`, `error`, and `update`
//! frames carrying the published payload under `data` (verbatim when it is JSON,
//! otherwise as a string).

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::broadcast::LiveUpdate;

/// Control message sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the watch set
    SetWatch { items: Vec<String> },
    /// Watch one more item
    AddWatch { item: String },
    /// Stop watching an item
    RemoveWatch { item: String },
    /// Receive series-wide updates for another series
    Subscribe { series: String },
    /// Stop receiving series-wide updates for a series
    Unsubscribe { series: String },
    /// Heartbeat
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Control reply sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection is live
    Welcome {
        conn_id: u64,
        series: String,
        class: String,
    },
    /// Current watch set after a change
    Watching { items: Vec<String> },
    /// Series the connection receives updates for after a change
    Subscribed { series: Vec<String> },
    /// Heartbeat reply
    Pong,
    /// Rejected request
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            message: message.to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Update payload as it appears in the `data` field
#[derive(Serialize)]
#[serde(untagged)]
enum FrameData<'a> {
    Json(&'a RawValue),
    Text(Cow<'a, str>),
}

impl<'a> FrameData<'a> {
    fn from_payload(payload: &'a [u8]) -> Self {
        match serde_json::from_slice::<&RawValue>(payload) {
            Ok(raw) => Self::Json(raw),
            Err(_) => Self::Text(String::from_utf8_lossy(payload)),
        }
    }
}

#[derive(Serialize)]
struct UpdateFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<&'a str>,
    data: FrameData<'a>,
}

/// Frame an update for the wire
///
/// JSON payloads are embedded as-is; anything else is sent as a JSON string.
pub fn encode_update(update: &LiveUpdate) -> Result<String, serde_json::Error> {
    serde_json::to_string(&UpdateFrame {
        kind: "update",
        series: update.series.as_deref(),
        item: update.item.as_deref(),
        data: FrameData::from_payload(&update.data),
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_parse_client_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"add_watch","item":"event-42"}"#).unwrap(),
            ClientMessage::AddWatch {
                item: "event-42".into()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"set_watch","items":["a","b"]}"#).unwrap(),
            ClientMessage::SetWatch {
                items: vec!["a".into(), "b".into()]
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(ClientMessage::parse(r#"{"type":"launch"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"add_watch"}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn test_encode_server_messages() {
        assert_eq!(ServerMessage::Pong.encode().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(
            ServerMessage::error("bad").encode().unwrap(),
            r#"{"type":"error","message":"bad"}"#
        );
    }

    #[test]
    fn test_encode_update_embeds_payload() {
        let update = LiveUpdate::targeted("auto21", "event-42", Bytes::from_static(br#"{"lap":1}"#));
        assert_eq!(
            encode_update(&update).unwrap(),
            r#"{"type":"update","series":"auto21","item":"event-42","data":{"lap":1}}"#
        );

        let update = LiveUpdate::cross_series("event-42", Bytes::from_static(b"[1,2]"));
        assert_eq!(
            encode_update(&update).unwrap(),
            r#"{"type":"update","item":"event-42","data":[1,2]}"#
        );
    }

    #[test]
    fn test_encode_update_wraps_non_json_as_string() {
        let update = LiveUpdate::series_wide("auto21", Bytes::from_static(b"{oops"));
        assert_eq!(
            encode_update(&update).unwrap(),
            r#"{"type":"update","series":"auto21","data":"{oops"}"#
        );

        let update = LiveUpdate::targeted("auto21", "event-42", Bytes::from_static(b"car 12 \"finished\""));
        let frame: serde_json::Value = serde_json::from_str(&encode_update(&update).unwrap()).unwrap();
        assert_eq!(frame["data"], "car 12 \"finished\"");
    }
}
