//! Phoenix channel frames (JSON serializer, vsn 1.0.0) as spoken by the
//! realtime endpoint, and decoding of postgres change notifications.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{Bookmark, BookmarkId};

pub const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Which table changes to listen to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub schema: String,
    pub table: String,
    /// Restricts INSERT notifications to one owner. DELETE payloads cannot be
    /// filtered server-side, so that binding stays table-wide.
    pub user_filter: Option<String>,
}

impl ChannelSpec {
    pub fn bookmarks(user_id: &str) -> Self {
        Self {
            name: "bookmarks-realtime".to_string(),
            schema: "public".to_string(),
            table: "bookmarks".to_string(),
            user_filter: Some(user_id.to_string()),
        }
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}", self.name)
    }

    fn postgres_changes(&self) -> Value {
        let mut insert = json!({
            "event": "INSERT",
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(user_id) = &self.user_filter {
            insert["filter"] = json!(format!("user_id=eq.{user_id}"));
        }
        let delete = json!({
            "event": "DELETE",
            "schema": self.schema,
            "table": self.table,
        });
        json!([insert, delete])
    }
}

pub fn join_frame(spec: &ChannelSpec, access_token: &str, reference: &str) -> Frame {
    Frame {
        topic: spec.topic(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": spec.postgres_changes(),
                "private": false,
            },
            "access_token": access_token,
        }),
        reference: Some(reference.to_string()),
        join_ref: Some(reference.to_string()),
    }
}

pub fn heartbeat_frame(reference: &str) -> Frame {
    Frame {
        topic: PHOENIX_TOPIC.to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// Hands the channel a renewed JWT so it keeps authorizing change notifications.
pub fn access_token_frame(spec: &ChannelSpec, access_token: &str, reference: &str) -> Frame {
    Frame {
        topic: spec.topic(),
        event: "access_token".to_string(),
        payload: json!({ "access_token": access_token }),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

pub fn leave_frame(spec: &ChannelSpec, reference: &str) -> Frame {
    Frame {
        topic: spec.topic(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// A row-level change relevant to the local collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    Delete(BookmarkId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Change(ChangeEvent),
    /// Reply to our join: `Err` carries the server's reason.
    Joined(std::result::Result<(), String>),
    /// The server closed or errored the channel.
    Closed(String),
    Other,
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum ChangeData {
    Insert { record: Bookmark },
    Delete { old_record: OldRecord },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct OldRecord {
    id: BookmarkId,
}

/// Decode one text frame received on `topic`.
pub fn decode(text: &str, topic: &str, join_ref: &str) -> Result<Incoming> {
    let frame: Frame = serde_json::from_str(text)?;
    if frame.topic != topic {
        return Ok(Incoming::Other);
    }

    let incoming = match frame.event.as_str() {
        "postgres_changes" => {
            let payload: ChangePayload = serde_json::from_value(frame.payload)?;
            match payload.data {
                ChangeData::Insert { record } => Incoming::Change(ChangeEvent::Insert(record)),
                ChangeData::Delete { old_record } => {
                    Incoming::Change(ChangeEvent::Delete(old_record.id))
                }
                ChangeData::Ignored => Incoming::Other,
            }
        }
        "phx_reply" if frame.reference.as_deref() == Some(join_ref) => {
            match frame.payload["status"].as_str() {
                Some("ok") => Incoming::Joined(Ok(())),
                _ => Incoming::Joined(Err(reason(&frame.payload["response"]))),
            }
        }
        "phx_close" => Incoming::Closed("channel closed by server".to_string()),
        "phx_error" => Incoming::Closed(reason(&frame.payload)),
        "system" if frame.payload["status"].as_str() == Some("error") => {
            Incoming::Closed(reason(&frame.payload))
        }
        _ => Incoming::Other,
    };
    Ok(incoming)
}

fn reason(value: &Value) -> String {
    value
        .get("reason")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
