//! Room/call controller: the single entry point a host drives.
//!
//! The host feeds every asynchronous completion in as an [`Event`] and every user
//! input through a method; both return the [`Action`]s the UI should apply.
//!
//! ```text
//! menu -> setup(host|join) -> call -> menu
//!   \-> library -> menu
//! ```

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};

use crate::content::{Chapter, ContentClient};
use crate::ids::{ParticipantId, RoomId, HOST_LABEL, JOINER_LABEL, UNKNOWN_SENDER};
use crate::link::MediaLink;
use crate::media::{CaptureDevices, CapturePurpose, DeviceError, MediaSession};
use crate::protocol::SyncMessage;
use crate::recorder::{
    RecordedSession, Recorder, RecordingBackend, RecordingError, SessionLibrary, StartOutcome,
    DEFAULT_SLICE_INTERVAL,
};
use crate::registry::{Links, Participant, PeerRegistry};
use crate::signaling::{SignalingClient, SignalingEvent, Substrate, SubstrateEvent};
use crate::stream::{MediaStream, SourceKind};
use crate::sync::{ChatMessage, Layout, SyncEngine};

pub const STATUS_INITIALIZING: &str = "Initializing...";
pub const STATUS_ROOM_ACTIVE: &str = "Room Active";
pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_JOINING: &str = "Joining...";
pub const STATUS_RECONNECTING: &str = "Reconnecting...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Joiner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Menu,
    Setup(Role),
    Call,
    Library,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Mobile form factor: recording always uses the camera stream.
    pub mobile: bool,
    pub slice_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mobile: false,
            slice_interval: DEFAULT_SLICE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("room id is empty")]
    EmptyRoomId,
    #[error("cannot {action} from {from:?}")]
    InvalidTransition { from: View, action: &'static str },
}

/// Asynchronous completions reported by the host.
#[derive(Debug)]
pub enum Event {
    Signaling(SubstrateEvent),
    /// A media link produced the peer's stream.
    RemoteStream { peer: ParticipantId, stream: MediaStream },
    MediaClosed(ParticipantId),
    DataOpened(ParticipantId),
    DataReceived { peer: ParticipantId, payload: Vec<u8> },
    DataClosed(ParticipantId),
    CameraGranted(MediaStream),
    ScreenGranted { purpose: CapturePurpose, stream: MediaStream },
    CaptureFailed { purpose: CapturePurpose, error: DeviceError },
    /// A device track ended outside our control.
    TrackEnded(String),
    RecordingSlice(Vec<u8>),
    RecordingStopped { mime: Option<String> },
    ChapterLoaded { ticket: u64, chapter: Chapter },
}

/// What the UI should do in response.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ViewChanged(View),
    RoomCreated(RoomId),
    Status(String),
    ParticipantsChanged(Vec<Participant>),
    LayoutChanged(Layout),
    ChapterRequested { book_id: String, chapter: u32 },
    ChapterShown(Chapter),
    ScrollToVerse(u32),
    ChatAppended(ChatMessage),
    HandChanged { peer: ParticipantId, raised: bool },
    LocalHandChanged(bool),
    OutboundChanged { source: SourceKind, muted: bool, video_off: bool },
    DeviceDenied(String),
    RecordingStarted(SourceKind),
    RecordingStopped,
    RecordingPending { suggested_title: String, duration: String },
    RecordingSaved { id: String, title: String },
    RecordingDiscarded,
    RecordingFailed(String),
}

/// External collaborators the controller drives.
pub struct Collaborators {
    pub substrate: Box<dyn Substrate>,
    pub devices: Box<dyn CaptureDevices>,
    pub recording: Box<dyn RecordingBackend>,
    pub content: Box<dyn ContentClient>,
}

pub struct CallController {
    view: View,
    role: Option<Role>,
    room: Option<RoomId>,
    status: String,
    signaling: SignalingClient,
    media: MediaSession,
    peers: PeerRegistry,
    sync: SyncEngine,
    recorder: Recorder,
    library: SessionLibrary,
}

impl CallController {
    pub fn new(collab: Collaborators, config: SessionConfig) -> Self {
        Self {
            view: View::Menu,
            role: None,
            room: None,
            status: STATUS_INITIALIZING.to_string(),
            signaling: SignalingClient::new(collab.substrate),
            media: MediaSession::new(collab.devices),
            peers: PeerRegistry::new(),
            sync: SyncEngine::new(collab.content),
            recorder: Recorder::new(collab.recording, config.slice_interval, config.mobile),
            library: SessionLibrary::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn signaling(&self) -> &SignalingClient {
        &self.signaling
    }

    pub fn media(&self) -> &MediaSession {
        &self.media
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn library(&self) -> &SessionLibrary {
        &self.library
    }

    fn is_host(&self) -> bool {
        self.role == Some(Role::Host)
    }

    fn in_call(&self) -> bool {
        self.view == View::Call
    }

    fn set_status(&mut self, status: impl Into<String>, actions: &mut Vec<Action>) {
        let status = status.into();
        if status != self.status {
            self.status = status.clone();
            actions.push(Action::Status(status));
        }
    }

    fn transition(&mut self, to: View, actions: &mut Vec<Action>) {
        if self.view != to {
            debug!("call: {:?} -> {:?}", self.view, to);
            self.view = to;
            actions.push(Action::ViewChanged(to));
        }
    }

    fn require_view(&self, expected: View, action: &'static str) -> Result<(), CallError> {
        if self.view == expected {
            Ok(())
        } else {
            Err(CallError::InvalidTransition {
                from: self.view,
                action,
            })
        }
    }

    /// Wire sender id: our network id once signaling is ready.
    fn sender_id(&self) -> String {
        self.signaling
            .local_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
    }

    fn participants_changed(&self) -> Action {
        Action::ParticipantsChanged(self.peers.participants())
    }

    fn outbound_changed(&self) -> Option<Action> {
        self.media.outbound().map(|s| Action::OutboundChanged {
            source: s.source,
            muted: self.media.is_muted(),
            video_off: self.media.is_video_off(),
        })
    }

    // ---- menu / setup ----

    /// Host path: mint a fresh room id and go to setup.
    pub fn create_room(&mut self) -> Result<Vec<Action>, CallError> {
        self.create_room_with(RoomId::generate())
    }

    /// Host path with a caller-chosen room id.
    pub fn create_room_with(&mut self, room: RoomId) -> Result<Vec<Action>, CallError> {
        self.require_view(View::Menu, "create a room")?;
        info!("call: created room {room}");
        let mut actions = vec![Action::RoomCreated(room.clone())];
        self.room = Some(room);
        self.role = Some(Role::Host);
        self.enter_setup(Role::Host, &mut actions);
        Ok(actions)
    }

    /// Joiner path: go to setup and wait for a room id.
    pub fn start_join(&mut self) -> Result<Vec<Action>, CallError> {
        self.require_view(View::Menu, "join a room")?;
        self.room = None;
        self.role = Some(Role::Joiner);
        let mut actions = Vec::new();
        self.enter_setup(Role::Joiner, &mut actions);
        Ok(actions)
    }

    fn enter_setup(&mut self, role: Role, actions: &mut Vec<Action>) {
        self.transition(View::Setup(role), actions);
        self.set_status(STATUS_INITIALIZING, actions);
        if self.media.outbound().is_none() {
            self.media.acquire_camera();
        }
    }

    /// Joiner: enter the call for `input`. Blank input is rejected.
    pub fn join(&mut self, input: &str) -> Result<Vec<Action>, CallError> {
        self.require_view(View::Setup(Role::Joiner), "join")?;
        let room = RoomId::parse(input).ok_or(CallError::EmptyRoomId)?;
        self.room = Some(room);
        self.enter_call_inner()
    }

    /// Host: enter the call for the room created earlier.
    pub fn enter_call(&mut self) -> Result<Vec<Action>, CallError> {
        self.require_view(View::Setup(Role::Host), "start the call")?;
        self.enter_call_inner()
    }

    fn enter_call_inner(&mut self) -> Result<Vec<Action>, CallError> {
        let mut actions = Vec::new();
        self.transition(View::Call, &mut actions);
        if self.media.outbound().is_some() {
            self.open_signaling();
        } else {
            // signaling opens once the camera is granted
            self.media.acquire_camera();
        }
        Ok(actions)
    }

    fn open_signaling(&mut self) {
        if !self.signaling.is_idle() {
            return;
        }
        let desired = match self.role {
            Some(Role::Host) => self.room.as_ref().map(RoomId::participant_id),
            _ => None,
        };
        self.signaling.open(desired);
    }

    pub fn open_library(&mut self) -> Result<Vec<Action>, CallError> {
        self.require_view(View::Menu, "open the library")?;
        let mut actions = Vec::new();
        self.transition(View::Library, &mut actions);
        Ok(actions)
    }

    /// Leave setup or the library. Use [`hang_up`](Self::hang_up) to leave a call.
    pub fn back_to_menu(&mut self) -> Result<Vec<Action>, CallError> {
        let mut actions = Vec::new();
        match self.view {
            View::Menu => {}
            View::Library => self.transition(View::Menu, &mut actions),
            View::Setup(_) => {
                self.media.release();
                self.role = None;
                self.room = None;
                self.transition(View::Menu, &mut actions);
            }
            View::Call => {
                return Err(CallError::InvalidTransition {
                    from: View::Call,
                    action: "go back",
                })
            }
        }
        Ok(actions)
    }

    pub fn remove_recording(&mut self, id: &str) -> Option<RecordedSession> {
        self.library.remove(id)
    }

    // ---- in-call inputs ----

    pub fn navigate(&mut self, book_id: &str, chapter: u32) -> Vec<Action> {
        self.sync.navigate(book_id, chapter, &mut self.peers)
    }

    pub fn next_chapter(&mut self) -> Vec<Action> {
        self.sync.next_chapter(&mut self.peers)
    }

    pub fn prev_chapter(&mut self) -> Vec<Action> {
        self.sync.prev_chapter(&mut self.peers)
    }

    pub fn tap_verse(&mut self, verse_number: u32) -> Vec<Action> {
        self.sync.tap_verse(verse_number, &mut self.peers)
    }

    pub fn toggle_layout(&mut self) -> Vec<Action> {
        self.sync.toggle_layout()
    }

    pub fn send_chat(&mut self, text: &str) -> Vec<Action> {
        let label = if self.is_host() { HOST_LABEL } else { JOINER_LABEL };
        let sender = self.sender_id();
        self.sync.send_chat(text, label, &sender, &mut self.peers)
    }

    pub fn toggle_hand(&mut self) -> Vec<Action> {
        let sender = self.sender_id();
        self.sync.toggle_hand(&sender, &mut self.peers)
    }

    pub fn toggle_mute(&mut self) -> Vec<Action> {
        self.media.toggle_mute();
        self.outbound_changed().into_iter().collect()
    }

    pub fn toggle_video(&mut self) -> Vec<Action> {
        self.media.toggle_video();
        self.outbound_changed().into_iter().collect()
    }

    /// Start sharing the screen, or go back to the camera when already sharing.
    /// The swap happens when the device grant arrives.
    pub fn toggle_screen_share(&mut self) -> Vec<Action> {
        if !self.in_call() {
            return Vec::new();
        }
        if self.media.is_screen_sharing() {
            self.media.acquire_camera();
        } else {
            self.media.acquire_screen();
        }
        Vec::new()
    }

    pub fn start_recording(&mut self, prefer_screen: bool) -> Vec<Action> {
        if !self.in_call() {
            return Vec::new();
        }
        let local = self.media.outbound().cloned();
        let outcome = self.recorder.start(prefer_screen, local.as_ref(), &mut self.media);
        self.recording_outcome(outcome.map(Some))
    }

    fn recording_outcome(&mut self, outcome: Result<Option<StartOutcome>, RecordingError>) -> Vec<Action> {
        let mut actions = Vec::new();
        match outcome {
            Ok(Some(StartOutcome::Recording(source))) => actions.push(Action::RecordingStarted(source)),
            Ok(Some(StartOutcome::AwaitingScreen)) | Ok(None) => {}
            Err(RecordingError::Unsupported(e)) => {
                warn!("call: recording unsupported: {e}");
                let text = RecordingError::Unsupported(e).status_text();
                actions.push(Action::RecordingFailed(text.clone()));
                self.set_status(text, &mut actions);
            }
            Err(RecordingError::PendingUnsaved) => {
                actions.push(Action::RecordingFailed(RecordingError::PendingUnsaved.status_text()));
                actions.extend(self.pending_prompt());
            }
            Err(e) => actions.push(Action::RecordingFailed(e.status_text())),
        }
        actions
    }

    fn pending_prompt(&self) -> Option<Action> {
        self.recorder.pending().map(|p| Action::RecordingPending {
            suggested_title: p.suggested_title.clone(),
            duration: p.duration.clone(),
        })
    }

    pub fn stop_recording(&mut self) -> Vec<Action> {
        match self.recorder.stop() {
            Ok(()) => vec![Action::RecordingStopped],
            Err(e) => {
                debug!("call: stop_recording: {e}");
                Vec::new()
            }
        }
    }

    /// Commit the pending recording to the library. `None` keeps the suggested title.
    pub fn save_recording(&mut self, title: Option<&str>) -> Vec<Action> {
        match self.recorder.save(title) {
            Ok(session) => {
                info!("call: saved recording {:?}", session.title);
                let action = Action::RecordingSaved {
                    id: session.id.clone(),
                    title: session.title.clone(),
                };
                self.library.add(session);
                vec![action]
            }
            Err(e) => {
                debug!("call: save_recording: {e}");
                Vec::new()
            }
        }
    }

    pub fn discard_recording(&mut self) -> Vec<Action> {
        match self.recorder.discard() {
            Ok(()) => vec![Action::RecordingDiscarded],
            Err(_) => Vec::new(),
        }
    }

    /// Leave the call: tear down signaling, stop an in-progress recording (its artifact
    /// still comes back for the save prompt), release devices and forget every peer.
    pub fn hang_up(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.in_call() {
            return actions;
        }
        info!("call: leaving");
        self.signaling.destroy();
        let was_recording = self.recorder.is_recording();
        if self.recorder.is_busy() && self.recorder.stop().is_ok() && was_recording {
            actions.push(Action::RecordingStopped);
        }
        self.media.release();
        self.peers.clear();
        self.sync.reset();
        self.role = None;
        self.room = None;
        actions.push(Action::ParticipantsChanged(Vec::new()));
        self.transition(View::Menu, &mut actions);
        self.set_status(STATUS_INITIALIZING, &mut actions);
        actions
    }

    // ---- events ----

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Signaling(ev) => match self.signaling.handle(ev) {
                Some(sev) => self.on_signaling(sev),
                None => Vec::new(),
            },
            Event::RemoteStream { peer, stream } => self.on_remote_stream(peer, stream),
            Event::MediaClosed(peer) => {
                if self.peers.media_closed(&peer) {
                    info!("call: {peer} left");
                }
                vec![self.participants_changed()]
            }
            Event::DataOpened(peer) => {
                let is_host = self.is_host();
                self.sync.on_peer_data_open(&peer, is_host, &mut self.peers);
                vec![self.participants_changed()]
            }
            Event::DataReceived { peer, payload } => match SyncMessage::from_payload(&payload) {
                Ok(msg) => self.sync.apply(&peer, msg, &mut self.peers),
                Err(e) => {
                    warn!("call: undecodable message from {peer}: {e}");
                    Vec::new()
                }
            },
            Event::DataClosed(peer) => {
                self.peers.data_closed(&peer);
                vec![self.participants_changed()]
            }
            Event::CameraGranted(stream) => self.on_camera_granted(stream),
            Event::ScreenGranted { purpose, stream } => self.on_screen_granted(purpose, stream),
            Event::CaptureFailed { purpose, error } => self.on_capture_failed(purpose, error),
            Event::TrackEnded(track_id) => {
                self.media.on_track_ended(&track_id);
                Vec::new()
            }
            Event::RecordingSlice(bytes) => {
                self.recorder.on_slice(bytes);
                Vec::new()
            }
            Event::RecordingStopped { mime } => {
                self.recorder.on_stopped(mime, &mut self.media);
                self.pending_prompt().into_iter().collect()
            }
            Event::ChapterLoaded { ticket, chapter } => self.sync.on_chapter_loaded(ticket, chapter),
        }
    }

    fn on_signaling(&mut self, event: SignalingEvent) -> Vec<Action> {
        let mut actions = Vec::new();
        match event {
            SignalingEvent::Ready(_) => {
                self.signaling.listen();
                if self.is_host() {
                    self.set_status(STATUS_ROOM_ACTIVE, &mut actions);
                } else {
                    self.set_status(STATUS_CONNECTED, &mut actions);
                    self.connect_to_host(&mut actions);
                }
            }
            SignalingEvent::Reconnecting => self.set_status(STATUS_RECONNECTING, &mut actions),
            SignalingEvent::Reconnected(_) => {
                if self.is_host() {
                    self.set_status(STATUS_ROOM_ACTIVE, &mut actions);
                } else {
                    self.set_status(STATUS_CONNECTED, &mut actions);
                    // links torn down with the old connection need a fresh dial
                    let host_gone = self
                        .room
                        .as_ref()
                        .is_some_and(|r| !self.peers.contains(&r.participant_id()));
                    if host_gone {
                        self.connect_to_host(&mut actions);
                    }
                }
            }
            SignalingEvent::IncomingMedia(link) => self.on_incoming_media(link, &mut actions),
            SignalingEvent::IncomingData(link) => {
                let peer = link.peer().clone();
                debug!("call: data link from {peer}");
                self.peers.add_or_update(peer, Links::data(link));
                actions.push(self.participants_changed());
            }
            SignalingEvent::Failed(e) => {
                warn!("call: signaling failed: {e}");
                self.set_status(e.status_text(), &mut actions);
            }
        }
        actions
    }

    fn connect_to_host(&mut self, actions: &mut Vec<Action>) {
        let (Some(host), Some(local)) = (
            self.room.as_ref().map(RoomId::participant_id),
            self.media.outbound().cloned(),
        ) else {
            return;
        };
        self.set_status(STATUS_JOINING, actions);
        let media = match self.signaling.dial(&host, &local) {
            Ok(link) => link,
            Err(e) => {
                self.set_status(e.status_text(), actions);
                return;
            }
        };
        let data = match self.signaling.open_data(&host) {
            Ok(link) => Some(link),
            Err(e) => {
                warn!("call: data link to {host} failed: {e}");
                None
            }
        };
        self.peers.add_or_update(host, Links { media: Some(media), data });
        actions.push(self.participants_changed());
    }

    fn on_incoming_media(&mut self, mut link: Box<dyn MediaLink>, actions: &mut Vec<Action>) {
        let peer = link.peer().clone();
        let Some(local) = self.media.outbound().cloned() else {
            warn!("call: no local stream to answer {peer} with");
            link.close();
            return;
        };
        if let Err(e) = link.answer(&local) {
            warn!("call: answering {peer} failed: {e}");
            link.close();
            return;
        }
        info!("call: answered {peer}");
        self.peers.add_or_update(peer, Links::media(link));
        actions.push(self.participants_changed());
    }

    fn on_remote_stream(&mut self, peer: ParticipantId, stream: MediaStream) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.peers.set_remote_stream(&peer, stream) {
            return actions;
        }
        let from_host = self.room.as_ref().map(|r| r.as_str() == peer.as_str()).unwrap_or(false);
        if !self.is_host() && from_host {
            self.set_status(STATUS_CONNECTED, &mut actions);
        }
        actions.push(self.participants_changed());
        actions
    }

    fn on_camera_granted(&mut self, stream: MediaStream) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.media.on_camera_granted(stream, &mut self.peers) {
            return actions;
        }
        actions.extend(self.outbound_changed());
        if self.in_call() {
            self.open_signaling();
        }
        actions
    }

    fn on_screen_granted(&mut self, purpose: CapturePurpose, stream: MediaStream) -> Vec<Action> {
        match purpose {
            CapturePurpose::Outbound => {
                if !self.in_call() {
                    self.media.stop_stream(&stream);
                    return Vec::new();
                }
                self.media.on_screen_granted(stream, &mut self.peers);
                self.outbound_changed().into_iter().collect()
            }
            CapturePurpose::Recording => {
                let outcome = self.recorder.on_screen_granted(stream, &mut self.media);
                self.recording_outcome(outcome.map(Some))
            }
        }
    }

    fn on_capture_failed(&mut self, purpose: CapturePurpose, error: DeviceError) -> Vec<Action> {
        let mut actions = Vec::new();
        match (purpose, error.device()) {
            (CapturePurpose::Recording, _) => {
                let local = self.media.outbound().cloned();
                let outcome = self.recorder.on_screen_failed(&error, local.as_ref(), &mut self.media);
                return self.recording_outcome(outcome);
            }
            (CapturePurpose::Outbound, SourceKind::Camera) => {
                self.media.on_capture_failed(purpose, &error);
                let text = error.status_text();
                actions.push(Action::DeviceDenied(text.clone()));
                self.set_status(text, &mut actions);
            }
            (CapturePurpose::Outbound, SourceKind::Screen) => {
                self.media.on_capture_failed(purpose, &error);
                if let DeviceError::Unavailable(..) = error {
                    actions.push(Action::DeviceDenied(error.status_text()));
                }
            }
        }
        actions
    }
}

impl fmt::Debug for CallController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallController")
            .field("view", &self.view)
            .field("role", &self.role)
            .field("room", &self.room)
            .field("status", &self.status)
            .field("signaling", &self.signaling)
            .field("peers", &self.peers)
            .finish()
    }
}
