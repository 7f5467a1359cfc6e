//! Selah group-study session layer.
//!
//! A study room is a [`CallController`]: the embedding app feeds it [`Event`]s from
//! the relay, capture devices and content service, calls its methods for user input,
//! and carries out the [`Action`]s it returns. Sockets, timers and screens stay outside.

pub mod assistant;
pub mod call;
pub mod catalog;
pub mod content;
pub mod ids;
pub mod link;
pub mod media;
pub mod narration;
pub mod protocol;
pub mod recorder;
pub mod registry;
pub mod signaling;
pub mod stream;
pub mod sync;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use assistant::{AssistantClient, Passage, Request, Speaker, StudyCoach, Turn};
pub use call::{Action, CallController, CallError, Collaborators, Event, Role, SessionConfig, View};
pub use content::{Chapter, ContentClient, Verse};
pub use ids::{ParticipantId, RoomId};
pub use link::{DataLink, LinkError, MediaLink};
pub use media::{CaptureDevices, CapturePurpose, DeviceError};
pub use protocol::SyncMessage;
pub use recorder::{RecordedSession, RecordingBackend, RecordingError};
pub use signaling::{Substrate, SubstrateError, SubstrateEvent};
pub use stream::{MediaStream, MediaTrack, SourceKind, TrackKind};
pub use sync::{ChatMessage, Layout};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
