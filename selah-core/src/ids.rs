//! Participant and room identity.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Sender label used for ambient notices in the chat transcript.
pub const SYSTEM_SENDER: &str = "System";

/// Local chat label when the local participant hosts the room.
pub const HOST_LABEL: &str = "Host";

/// Local chat label when the local participant joined someone else's room.
pub const JOINER_LABEL: &str = "Me";

/// Wire sender id used before the substrate has assigned one.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Network identifier of a participant on the relay substrate.
/// Stable for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        ParticipantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last four characters, used in short notices ("Peer 1a2b raised their hand.").
    pub fn short(&self) -> &str {
        let n = self.0.chars().count();
        if n <= 4 {
            return &self.0;
        }
        let skip = self
            .0
            .char_indices()
            .nth(n - 4)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.0[skip..]
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        ParticipantId(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        ParticipantId(s)
    }
}

/// Opaque room identifier. The host claims it as its own signaling id;
/// joiners dial it. Shared out-of-band as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Fresh UUID-shaped room id.
    pub fn generate() -> Self {
        RoomId(uuid::Uuid::new_v4().to_string())
    }

    /// UUID-shaped id built from a plain RNG, for runtimes without a UUID source.
    /// Fills `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx` with hex digits; `y` gets the variant bits.
    pub fn fallback<R: Rng>(rng: &mut R) -> Self {
        const TEMPLATE: &str = "xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx";
        let id = TEMPLATE
            .chars()
            .map(|c| match c {
                'x' => hex_digit(rng.gen_range(0..16)),
                'y' => hex_digit((rng.gen_range(0..16) & 0x3) | 0x8),
                other => other,
            })
            .collect();
        RoomId(id)
    }

    /// Parse user input (copy/pasted id). Surrounding whitespace is dropped; empty input is rejected.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(RoomId(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The signaling identifier the host claims for this room.
    pub fn participant_id(&self) -> ParticipantId {
        ParticipantId(self.0.clone())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_digit(v: u32) -> char {
    std::char::from_digit(v, 16).unwrap_or('0')
}
