//! Chat entities

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// A chat participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// `usr_…` identifier
    pub id: String,
    /// Display name, unique per store
    pub nickname: String,
}

impl User {
    /// New user with a fresh id
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            id: ids::new_user_id(),
            nickname: nickname.into(),
        }
    }
}

/// A posted message; the event fanned out to subscribers
///
/// Serialized with camelCase keys and an RFC 3339 `createdAt` at second
/// precision, so a message decoded from the bus compares equal to the one
/// that was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// `msg_…` identifier
    pub id: String,
    /// Author
    pub user: User,
    /// Message text
    pub content: String,
    /// Creation time
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// New message stamped with the current time
    pub fn new(user: User, content: impl Into<String>) -> Self {
        Self {
            id: ids::new_message_id(),
            user,
            content: content.into(),
            created_at: Utc::now().trunc_subsecs(0),
        }
    }
}

mod rfc3339 {
    use super::*;
    use serde::{de::Error as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Message {
        Message {
            id: "msg_1".into(),
            user: User {
                id: "usr_1".into(),
                nickname: "alice".into(),
            },
            content: "hello".into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "msg_1",
                "user": {"id": "usr_1", "nickname": "alice"},
                "content": "hello",
                "createdAt": "2024-05-01T12:30:00Z"
            })
        );
    }

    #[test]
    fn test_decode_preserves_identity() {
        let sent = Message::new(User::new("bob"), "hi");
        let decoded: Message = serde_json::from_str(&serde_json::to_string(&sent).unwrap()).unwrap();
        assert_eq!(decoded, sent);
    }

    #[test]
    fn test_decode_accepts_offsets() {
        let decoded: Message = serde_json::from_value(json!({
            "id": "msg_1",
            "user": {"id": "usr_1", "nickname": "alice"},
            "content": "hello",
            "createdAt": "2024-05-01T21:30:00+09:00"
        }))
        .unwrap();

        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_new_ids() {
        let message = Message::new(User::new("carol"), "x");
        assert!(message.id.starts_with("msg_"));
        assert!(message.user.id.starts_with("usr_"));
        assert_eq!(message.created_at.timestamp_subsec_nanos(), 0);
    }
}
