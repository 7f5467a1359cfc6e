//! Selah sync protocol: the closed set of messages carried over data links.

use serde::{Deserialize, Serialize};

/// Application-level sync messages. Encoding is one JSON object per data-link send,
/// tagged by `type`. There is no version field; peers must run compatible code.
///
/// Every message is self-contained and safe to reapply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// Move the shared reading position.
    #[serde(rename_all = "camelCase")]
    Navigate { book_id: String, chapter: u32 },
    /// Highlight a verse in the current chapter.
    #[serde(rename_all = "camelCase")]
    Highlight { verse_number: u32 },
    /// Chat line authored by `sender_id`.
    #[serde(rename_all = "camelCase")]
    Chat { text: String, sender_id: String },
    /// Hand-raise state of `sender_id`.
    #[serde(rename_all = "camelCase")]
    Hand { raised: bool, sender_id: String },
}

impl SyncMessage {
    /// Encode for a data-link send.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a payload received on a data link.
    pub fn from_payload(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Navigate { .. } => "NAVIGATE",
            SyncMessage::Highlight { .. } => "HIGHLIGHT",
            SyncMessage::Chat { .. } => "CHAT",
            SyncMessage::Hand { .. } => "HAND",
        }
    }
}
