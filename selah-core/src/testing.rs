//! In-memory fakes for every collaborator trait. Each fake records calls into a
//! shared log so tests keep a handle after boxing it.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::assistant::{AssistantClient, Turn};
use crate::call::{Action, CallController, Collaborators, Event, SessionConfig};
use crate::catalog;
use crate::content::{Chapter, ContentClient, Verse};
use crate::ids::ParticipantId;
use crate::link::{DataLink, LinkError, MediaLink};
use crate::media::{CaptureDevices, CapturePurpose};
use crate::narration::{SpeechEngine, UtteranceId};
use crate::protocol::SyncMessage;
use crate::recorder::{RecordingBackend, RecordingError};
use crate::signaling::Substrate;
use crate::stream::{MediaStream, MediaTrack, SourceKind, TrackKind};

pub fn camera_stream(id: &str) -> MediaStream {
    MediaStream::new(
        id,
        SourceKind::Camera,
        vec![
            MediaTrack::new(format!("{id}-audio"), TrackKind::Audio),
            MediaTrack::new(format!("{id}-video"), TrackKind::Video),
        ],
    )
}

pub fn screen_stream(id: &str, with_audio: bool) -> MediaStream {
    let mut tracks = vec![MediaTrack::new(format!("{id}-video"), TrackKind::Video)];
    if with_audio {
        tracks.push(MediaTrack::new(format!("{id}-audio"), TrackKind::Audio));
    }
    MediaStream::new(id, SourceKind::Screen, tracks)
}

pub fn sample_chapter(book_id: &str, chapter: u32) -> Chapter {
    Chapter {
        book_id: book_id.to_string(),
        chapter_number: chapter,
        reference: catalog::reference(book_id, chapter),
        verses: vec![
            Verse {
                number: 1,
                text: "First verse.".into(),
            },
            Verse {
                number: 2,
                text: "Second verse.".into(),
            },
        ],
        content: "First verse. Second verse.".into(),
    }
}

// ---- links ----

#[derive(Debug, Default)]
pub struct MediaLinkState {
    /// Id of the stream we answered with.
    pub answered: Option<String>,
    pub replaced: Vec<(TrackKind, Option<String>)>,
    pub closed: bool,
}

#[derive(Debug)]
struct FakeMediaLink {
    peer: ParticipantId,
    state: Rc<RefCell<MediaLinkState>>,
}

impl MediaLink for FakeMediaLink {
    fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    fn answer(&mut self, local: &MediaStream) -> Result<(), LinkError> {
        let mut s = self.state.borrow_mut();
        if s.closed {
            return Err(LinkError::Closed);
        }
        s.answered = Some(local.id.clone());
        Ok(())
    }

    fn replace_track(&mut self, kind: TrackKind, track: Option<&MediaTrack>) -> Result<(), LinkError> {
        let mut s = self.state.borrow_mut();
        if s.closed {
            return Err(LinkError::Closed);
        }
        s.replaced.push((kind, track.map(|t| t.id.clone())));
        Ok(())
    }

    fn close(&mut self) {
        self.state.borrow_mut().closed = true;
    }
}

pub fn fake_media_link(peer: &str) -> (Box<dyn MediaLink>, Rc<RefCell<MediaLinkState>>) {
    let state = Rc::new(RefCell::new(MediaLinkState::default()));
    let link = FakeMediaLink {
        peer: ParticipantId::new(peer),
        state: state.clone(),
    };
    (Box::new(link), state)
}

#[derive(Debug, Default)]
pub struct DataLinkState {
    pub open: bool,
    pub sent: Vec<Vec<u8>>,
    pub closed: bool,
    pub fail_sends: bool,
}

impl DataLinkState {
    pub fn sent_messages(&self) -> Vec<SyncMessage> {
        self.sent
            .iter()
            .map(|p| SyncMessage::from_payload(p).unwrap())
            .collect()
    }
}

#[derive(Debug)]
struct FakeDataLink {
    peer: ParticipantId,
    state: Rc<RefCell<DataLinkState>>,
}

impl DataLink for FakeDataLink {
    fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    fn is_open(&self) -> bool {
        let s = self.state.borrow();
        s.open && !s.closed
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let mut s = self.state.borrow_mut();
        if s.closed {
            return Err(LinkError::Closed);
        }
        if s.fail_sends {
            return Err(LinkError::Transport("send failed".into()));
        }
        s.sent.push(payload.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.state.borrow_mut().closed = true;
    }
}

pub fn fake_data_link(peer: &str, open: bool) -> (Box<dyn DataLink>, Rc<RefCell<DataLinkState>>) {
    let state = Rc::new(RefCell::new(DataLinkState {
        open,
        ..Default::default()
    }));
    let link = FakeDataLink {
        peer: ParticipantId::new(peer),
        state: state.clone(),
    };
    (Box::new(link), state)
}

/// Hand everything `link` has sent to `to` as data from `from`, draining the log.
pub fn deliver(link: &Rc<RefCell<DataLinkState>>, to: &mut CallController, from: &str) -> Vec<Action> {
    let payloads = std::mem::take(&mut link.borrow_mut().sent);
    payloads
        .into_iter()
        .flat_map(|payload| {
            to.handle(Event::DataReceived {
                peer: ParticipantId::new(from),
                payload,
            })
        })
        .collect()
}

// ---- substrate ----

#[derive(Debug, Default)]
pub struct SubstrateLog {
    pub opens: Vec<Option<ParticipantId>>,
    pub reconnects: Vec<ParticipantId>,
    /// (target, outbound stream id)
    pub dials: Vec<(ParticipantId, String)>,
    pub data_opens: Vec<ParticipantId>,
    pub destroyed: usize,
    media_links: Vec<(ParticipantId, Rc<RefCell<MediaLinkState>>)>,
    data_links: Vec<(ParticipantId, Rc<RefCell<DataLinkState>>)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSubstrate {
    log: Rc<RefCell<SubstrateLog>>,
}

impl FakeSubstrate {
    pub fn log(&self) -> Ref<'_, SubstrateLog> {
        self.log.borrow()
    }

    /// State of the most recent media link dialed to `peer`.
    pub fn media_link(&self, peer: &ParticipantId) -> Option<Rc<RefCell<MediaLinkState>>> {
        self.log
            .borrow()
            .media_links
            .iter()
            .rev()
            .find(|(p, _)| p == peer)
            .map(|(_, s)| s.clone())
    }

    /// State of the most recent data link opened to `peer`.
    pub fn data_link(&self, peer: &ParticipantId) -> Option<Rc<RefCell<DataLinkState>>> {
        self.log
            .borrow()
            .data_links
            .iter()
            .rev()
            .find(|(p, _)| p == peer)
            .map(|(_, s)| s.clone())
    }
}

impl Substrate for FakeSubstrate {
    fn open(&mut self, desired: Option<&ParticipantId>) {
        self.log.borrow_mut().opens.push(desired.cloned());
    }

    fn reconnect(&mut self, id: &ParticipantId) {
        self.log.borrow_mut().reconnects.push(id.clone());
    }

    fn dial(&mut self, target: &ParticipantId, local: &MediaStream) -> Box<dyn MediaLink> {
        let (link, state) = fake_media_link(target.as_str());
        let mut log = self.log.borrow_mut();
        log.dials.push((target.clone(), local.id.clone()));
        log.media_links.push((target.clone(), state));
        link
    }

    fn open_data(&mut self, target: &ParticipantId) -> Box<dyn DataLink> {
        let (link, state) = fake_data_link(target.as_str(), false);
        let mut log = self.log.borrow_mut();
        log.data_opens.push(target.clone());
        log.data_links.push((target.clone(), state));
        link
    }

    fn destroy(&mut self) {
        self.log.borrow_mut().destroyed += 1;
    }
}

// ---- devices ----

#[derive(Debug, Default)]
pub struct DeviceLog {
    pub camera_requests: usize,
    pub screen_requests: Vec<CapturePurpose>,
    pub enabled: Vec<(String, bool)>,
    pub stopped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDevices {
    log: Rc<RefCell<DeviceLog>>,
}

impl FakeDevices {
    pub fn log(&self) -> Ref<'_, DeviceLog> {
        self.log.borrow()
    }
}

impl CaptureDevices for FakeDevices {
    fn request_camera(&mut self) {
        self.log.borrow_mut().camera_requests += 1;
    }

    fn request_screen(&mut self, purpose: CapturePurpose) {
        self.log.borrow_mut().screen_requests.push(purpose);
    }

    fn set_track_enabled(&mut self, track_id: &str, enabled: bool) {
        self.log.borrow_mut().enabled.push((track_id.to_string(), enabled));
    }

    fn stop_track(&mut self, track_id: &str) {
        self.log.borrow_mut().stopped.push(track_id.to_string());
    }
}

// ---- recording ----

#[derive(Debug, Default)]
pub struct RecorderLog {
    pub supported: Vec<String>,
    pub fail_start: bool,
    /// (stream id, container, timeslice)
    pub started: Vec<(String, Option<String>, Duration)>,
    pub stops: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeRecorderBackend {
    log: Rc<RefCell<RecorderLog>>,
}

impl FakeRecorderBackend {
    pub fn supporting(types: &[&str]) -> Self {
        let b = Self::default();
        b.log.borrow_mut().supported = types.iter().map(|t| t.to_string()).collect();
        b
    }

    pub fn fail_start(&self) {
        self.log.borrow_mut().fail_start = true;
    }

    pub fn log(&self) -> Ref<'_, RecorderLog> {
        self.log.borrow()
    }
}

impl RecordingBackend for FakeRecorderBackend {
    fn is_type_supported(&self, mime: &str) -> bool {
        self.log.borrow().supported.iter().any(|t| t == mime)
    }

    fn start(&mut self, stream: &MediaStream, mime: Option<&str>, timeslice: Duration) -> Result<(), RecordingError> {
        let mut log = self.log.borrow_mut();
        log.started
            .push((stream.id.clone(), mime.map(str::to_string), timeslice));
        if log.fail_start {
            return Err(RecordingError::Unsupported("encoder unavailable".into()));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.log.borrow_mut().stops += 1;
    }
}

// ---- content / speech ----

#[derive(Debug, Default)]
pub struct ContentLog {
    /// (ticket, book id, chapter)
    pub requests: Vec<(u64, String, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeContent {
    log: Rc<RefCell<ContentLog>>,
}

impl FakeContent {
    pub fn log(&self) -> Ref<'_, ContentLog> {
        self.log.borrow()
    }
}

impl ContentClient for FakeContent {
    fn request_chapter(&mut self, ticket: u64, book_id: &str, chapter: u32) {
        self.log
            .borrow_mut()
            .requests
            .push((ticket, book_id.to_string(), chapter));
    }
}

#[derive(Debug, Default)]
pub struct AssistantLog {
    /// (ticket, prompt)
    pub notes: Vec<(u64, String)>,
    /// (ticket, history, prompt)
    pub chats: Vec<(u64, Vec<Turn>, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeAssistant {
    log: Rc<RefCell<AssistantLog>>,
}

impl FakeAssistant {
    pub fn log(&self) -> Ref<'_, AssistantLog> {
        self.log.borrow()
    }
}

impl AssistantClient for FakeAssistant {
    fn generate_notes(&mut self, ticket: u64, prompt: &str) {
        self.log.borrow_mut().notes.push((ticket, prompt.to_string()));
    }

    fn chat(&mut self, ticket: u64, history: &[Turn], prompt: &str) {
        self.log
            .borrow_mut()
            .chats
            .push((ticket, history.to_vec(), prompt.to_string()));
    }
}

#[derive(Debug, Default)]
pub struct SpeechLog {
    pub spoken: Vec<(UtteranceId, String)>,
    pub pauses: usize,
    pub resumes: usize,
    pub cancels: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSpeech {
    log: Rc<RefCell<SpeechLog>>,
}

impl FakeSpeech {
    pub fn log(&self) -> Ref<'_, SpeechLog> {
        self.log.borrow()
    }
}

impl SpeechEngine for FakeSpeech {
    fn speak(&mut self, id: UtteranceId, text: &str) {
        self.log.borrow_mut().spoken.push((id, text.to_string()));
    }

    fn pause(&mut self) {
        self.log.borrow_mut().pauses += 1;
    }

    fn resume(&mut self) {
        self.log.borrow_mut().resumes += 1;
    }

    fn cancel(&mut self) {
        self.log.borrow_mut().cancels += 1;
    }
}

// ---- controller harness ----

/// A controller wired to fresh fakes, with handles to each.
pub struct Harness {
    pub call: CallController,
    pub substrate: FakeSubstrate,
    pub devices: FakeDevices,
    pub recording: FakeRecorderBackend,
    pub content: FakeContent,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let substrate = FakeSubstrate::default();
        let devices = FakeDevices::default();
        let recording = FakeRecorderBackend::supporting(&["video/webm"]);
        let content = FakeContent::default();
        let call = CallController::new(
            Collaborators {
                substrate: Box::new(substrate.clone()),
                devices: Box::new(devices.clone()),
                recording: Box::new(recording.clone()),
                content: Box::new(content.clone()),
            },
            config,
        );
        Self {
            call,
            substrate,
            devices,
            recording,
            content,
        }
    }
}
