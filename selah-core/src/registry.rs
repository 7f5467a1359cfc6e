//! Peer connection registry: one media link and one data link per remote participant.

use std::fmt;

use log::{debug, warn};

use crate::ids::ParticipantId;
use crate::link::{DataLink, MediaLink};
use crate::protocol::SyncMessage;
use crate::stream::MediaStream;

/// Links to attach in one `add_or_update` call.
#[derive(Debug, Default)]
pub struct Links {
    pub media: Option<Box<dyn MediaLink>>,
    pub data: Option<Box<dyn DataLink>>,
}

impl Links {
    pub fn media(link: Box<dyn MediaLink>) -> Self {
        Self {
            media: Some(link),
            data: None,
        }
    }

    pub fn data(link: Box<dyn DataLink>) -> Self {
        Self {
            media: None,
            data: Some(link),
        }
    }
}

#[derive(Debug)]
struct PeerEntry {
    id: ParticipantId,
    media: Option<Box<dyn MediaLink>>,
    /// Set once the media link produced a stream.
    remote_stream: Option<MediaStream>,
    data: Option<Box<dyn DataLink>>,
    hand_raised: bool,
}

impl PeerEntry {
    fn new(id: ParticipantId) -> Self {
        Self {
            id,
            media: None,
            remote_stream: None,
            data: None,
            hand_raised: false,
        }
    }

    fn data_open(&self) -> bool {
        self.data.as_ref().map(|d| d.is_open()).unwrap_or(false)
    }

    fn is_empty(&self) -> bool {
        self.media.is_none() && self.data.is_none()
    }

    fn close_all(&mut self) {
        if let Some(mut m) = self.media.take() {
            m.close();
        }
        if let Some(mut d) = self.data.take() {
            d.close();
        }
        self.remote_stream = None;
    }
}

/// Rendering snapshot of one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub stream: Option<MediaStream>,
    pub hand_raised: bool,
    pub data_open: bool,
}

#[derive(Default)]
pub struct PeerRegistry {
    entries: Vec<PeerEntry>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &ParticipantId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == *id)
    }

    fn entry_mut(&mut self, id: &ParticipantId) -> Option<&mut PeerEntry> {
        self.entries.iter_mut().find(|e| e.id == *id)
    }

    /// Insert a participant or attach links to an existing one. A link replacing one of
    /// the same kind closes the old link. Returns true if the participant is new.
    pub fn add_or_update(&mut self, id: ParticipantId, links: Links) -> bool {
        let is_new = !self.contains(&id);
        if is_new {
            debug!("registry: new participant {id}");
            self.entries.push(PeerEntry::new(id.clone()));
        }
        let Some(entry) = self.entry_mut(&id) else {
            return is_new;
        };
        if let Some(media) = links.media {
            if let Some(mut old) = entry.media.replace(media) {
                debug!("registry: replacing media link for {}", entry.id);
                old.close();
                entry.remote_stream = None;
            }
        }
        if let Some(data) = links.data {
            if let Some(mut old) = entry.data.replace(data) {
                debug!("registry: replacing data link for {}", entry.id);
                old.close();
            }
        }
        is_new
    }

    /// Record the stream a media link produced. Ignored if the participant has no media link.
    pub fn set_remote_stream(&mut self, id: &ParticipantId, stream: MediaStream) -> bool {
        match self.entry_mut(id) {
            Some(entry) if entry.media.is_some() => {
                entry.remote_stream = Some(stream);
                true
            }
            _ => {
                warn!("registry: stream from {id} without a media link");
                false
            }
        }
    }

    /// Participant left: close both links and drop the entry.
    pub fn remove(&mut self, id: &ParticipantId) -> bool {
        match self.position(id) {
            Some(i) => {
                let mut entry = self.entries.remove(i);
                entry.close_all();
                debug!("registry: removed {id}");
                true
            }
            None => false,
        }
    }

    /// The media link to `id` closed. Returns true if the participant is now gone.
    pub fn media_closed(&mut self, id: &ParticipantId) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        entry.media = None;
        entry.remote_stream = None;
        self.drop_if_empty(id)
    }

    /// The data link to `id` closed. Returns true if the participant is now gone.
    pub fn data_closed(&mut self, id: &ParticipantId) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        entry.data = None;
        self.drop_if_empty(id)
    }

    fn drop_if_empty(&mut self, id: &ParticipantId) -> bool {
        match self.position(id) {
            Some(i) if self.entries[i].is_empty() => {
                self.entries.remove(i);
                debug!("registry: {id} has no links left");
                true
            }
            _ => false,
        }
    }

    /// Participants whose media link has produced a stream, in join order.
    pub fn list_media_streams(&self) -> Vec<(ParticipantId, MediaStream)> {
        self.entries
            .iter()
            .filter(|e| e.media.is_some())
            .filter_map(|e| e.remote_stream.clone().map(|s| (e.id.clone(), s)))
            .collect()
    }

    /// Send to every participant with an open data link. Participants without one are
    /// skipped; a failed send is dropped for that peer. Returns the number delivered.
    pub fn broadcast_data(&mut self, message: &SyncMessage) -> usize {
        let payload = match message.to_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!("registry: cannot encode {}: {e}", message.kind());
                return 0;
            }
        };
        let mut delivered = 0;
        for entry in &mut self.entries {
            let Some(data) = entry.data.as_mut() else {
                continue;
            };
            if !data.is_open() {
                continue;
            }
            match data.send(&payload) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("registry: {} to {} dropped: {e}", message.kind(), entry.id),
            }
        }
        delivered
    }

    /// Send to one participant if its data link is open.
    pub fn send_to(&mut self, id: &ParticipantId, message: &SyncMessage) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        let Some(data) = entry.data.as_mut().filter(|d| d.is_open()) else {
            return false;
        };
        match message.to_payload() {
            Ok(payload) => data.send(&payload).is_ok(),
            Err(e) => {
                warn!("registry: cannot encode {}: {e}", message.kind());
                false
            }
        }
    }

    /// Every live media link, for in-place track swaps.
    pub fn media_links_mut(&mut self) -> impl Iterator<Item = &mut (dyn MediaLink + 'static)> {
        self.entries.iter_mut().filter_map(|e| e.media.as_deref_mut())
    }

    /// Returns false if the participant is unknown.
    pub fn set_hand(&mut self, id: &ParticipantId, raised: bool) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.hand_raised = raised;
                true
            }
            None => false,
        }
    }

    pub fn hand_raised(&self, id: &ParticipantId) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.hand_raised)
    }

    pub fn has_open_data(&self, id: &ParticipantId) -> bool {
        self.entries
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.data_open())
            .unwrap_or(false)
    }

    /// Connected: a media link that produced a stream, or an open data link.
    pub fn is_connected(&self, id: &ParticipantId) -> bool {
        self.entries
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.remote_stream.is_some() || e.data_open())
            .unwrap_or(false)
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.entries
            .iter()
            .map(|e| Participant {
                id: e.id.clone(),
                stream: e.remote_stream.clone(),
                hand_raised: e.hand_raised,
                data_open: e.data_open(),
            })
            .collect()
    }

    /// Close every link and forget every participant.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.close_all();
        }
        self.entries.clear();
    }
}

impl fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.id))
            .finish()
    }
}
