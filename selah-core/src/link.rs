//! Narrow link interfaces. Transports implement these; the registry and sync engine
//! only ever see trait objects. Inbound traffic (stream produced, data received,
//! link closed) is delivered by the host as events, not callbacks.

use std::fmt;

use crate::ids::ParticipantId;
use crate::stream::{MediaStream, MediaTrack, TrackKind};

/// Real-time audio/video connection to one participant.
pub trait MediaLink: fmt::Debug {
    fn peer(&self) -> &ParticipantId;

    /// Answer an inbound dial, sending `local` as our outbound stream.
    fn answer(&mut self, local: &MediaStream) -> Result<(), LinkError>;

    /// Swap the sender for `kind` to `track` in place, without renegotiating.
    /// `None` detaches the sender's track.
    fn replace_track(&mut self, kind: TrackKind, track: Option<&MediaTrack>) -> Result<(), LinkError>;

    fn close(&mut self);
}

/// Reliable, ordered side-channel to one participant.
pub trait DataLink: fmt::Debug {
    fn peer(&self) -> &ParticipantId;

    /// True once the open handshake completed and until close.
    fn is_open(&self) -> bool;

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    fn close(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}
