//! Session recorder: captures a stream in fixed-interval slices and holds the
//! finished artifact until the user saves or discards it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use crate::media::{DeviceError, MediaSession};
use crate::stream::{MediaStream, SourceKind};

/// Probed in order; the first supported one is used.
pub const CONTAINER_PREFERENCE: [&str; 3] = ["video/mp4", "video/webm;codecs=vp9", "video/webm"];
/// Assumed when the backend does not report what it produced.
pub const DEFAULT_CONTAINER: &str = "video/webm";
pub const DEFAULT_SLICE_INTERVAL: Duration = Duration::from_millis(1000);
pub const UNTITLED: &str = "Untitled Session";

/// Encodes a stream. Slices and the final stop come back as host events.
pub trait RecordingBackend: fmt::Debug {
    fn is_type_supported(&self, mime: &str) -> bool;
    /// `mime == None` lets the backend pick its own default.
    fn start(&mut self, stream: &MediaStream, mime: Option<&str>, timeslice: Duration) -> Result<(), RecordingError>;
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordingError {
    #[error("recording not supported: {0}")]
    Unsupported(String),
    #[error("no stream available to record")]
    NoStream,
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("not recording")]
    NotRecording,
    #[error("no finished recording pending")]
    NothingPending,
    #[error("save or discard the previous recording first")]
    PendingUnsaved,
}

impl RecordingError {
    pub fn status_text(&self) -> String {
        match self {
            RecordingError::Unsupported(_) => "Recording not supported".to_string(),
            RecordingError::NoStream => "No camera stream available to record.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Pick the first supported container, or `None` to defer to the backend.
pub fn select_container(backend: &dyn RecordingBackend) -> Option<&'static str> {
    CONTAINER_PREFERENCE
        .iter()
        .copied()
        .find(|m| backend.is_type_supported(m))
}

/// File extension for a container type.
pub fn extension_for(mime: &str) -> &'static str {
    if mime.starts_with("video/mp4") {
        "mp4"
    } else if mime.starts_with("video/webm") {
        "webm"
    } else {
        "bin"
    }
}

/// Coarse label: `N sec` under a minute, whole minutes otherwise.
pub fn duration_label(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs} sec")
    } else {
        format!("{} min", secs / 60)
    }
}

pub fn default_title(at: DateTime<Local>) -> String {
    format!("Study Session - {}", at.format("%H:%M:%S"))
}

/// Result of asking the recorder to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Waiting on the screen-capture prompt.
    AwaitingScreen,
    Recording(SourceKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingMedia {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// A finished artifact waiting on the save prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecording {
    pub media: RecordingMedia,
    pub source: SourceKind,
    pub suggested_title: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSession {
    pub id: String,
    pub title: String,
    pub media: RecordingMedia,
    pub created_at: DateTime<Local>,
    pub duration: String,
    pub source: SourceKind,
}

impl RecordedSession {
    /// Title with whitespace runs turned into `_`, plus the container's extension.
    pub fn download_name(&self) -> String {
        let stem = self.title.split_whitespace().collect::<Vec<_>>().join("_");
        format!("{}.{}", stem, extension_for(&self.media.mime))
    }
}

/// In-memory library of saved sessions, newest first.
#[derive(Debug, Default)]
pub struct SessionLibrary {
    sessions: Vec<RecordedSession>,
}

impl SessionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, session: RecordedSession) {
        self.sessions.insert(0, session);
    }

    pub fn list(&self) -> &[RecordedSession] {
        &self.sessions
    }

    pub fn get(&self, id: &str) -> Option<&RecordedSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<RecordedSession> {
        let idx = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[derive(Debug)]
enum State {
    Idle,
    AwaitingScreen,
    Recording(Capture),
    Finalizing(Capture),
}

#[derive(Debug)]
struct Capture {
    stream: MediaStream,
    source: SourceKind,
    /// Stream was captured for the recorder alone and is stopped on finalize.
    dedicated: bool,
    mime: Option<&'static str>,
}

pub struct Recorder {
    backend: Box<dyn RecordingBackend>,
    state: State,
    slices: Vec<Vec<u8>>,
    pending: Option<PendingRecording>,
    slice_interval: Duration,
    mobile: bool,
}

impl Recorder {
    pub fn new(backend: Box<dyn RecordingBackend>, slice_interval: Duration, mobile: bool) -> Self {
        Self {
            backend,
            state: State::Idle,
            slices: Vec::new(),
            pending: None,
            slice_interval,
            mobile,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording(_))
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn pending(&self) -> Option<&PendingRecording> {
        self.pending.as_ref()
    }

    /// Begin recording. A screen capture is requested when `prefer_screen` and not on
    /// a mobile form factor; otherwise the camera stream is recorded directly.
    pub fn start(
        &mut self,
        prefer_screen: bool,
        camera: Option<&MediaStream>,
        media: &mut MediaSession,
    ) -> Result<StartOutcome, RecordingError> {
        if self.is_busy() {
            return Err(RecordingError::AlreadyRecording);
        }
        if self.pending.is_some() {
            return Err(RecordingError::PendingUnsaved);
        }
        if prefer_screen && !self.mobile {
            debug!("recorder: requesting dedicated screen capture");
            self.state = State::AwaitingScreen;
            media.request_recording_screen();
            return Ok(StartOutcome::AwaitingScreen);
        }
        let stream = camera.cloned().ok_or(RecordingError::NoStream)?;
        self.begin(stream, SourceKind::Camera, false, media)
    }

    /// The dedicated screen capture was granted.
    pub fn on_screen_granted(
        &mut self,
        stream: MediaStream,
        media: &mut MediaSession,
    ) -> Result<StartOutcome, RecordingError> {
        if !matches!(self.state, State::AwaitingScreen) {
            media.stop_stream(&stream);
            return Err(RecordingError::NotRecording);
        }
        self.begin(stream, SourceKind::Screen, true, media)
    }

    /// The dedicated screen capture failed. A user decline quietly abandons the
    /// recording (`Ok(None)`); any other failure falls back to the camera stream.
    pub fn on_screen_failed(
        &mut self,
        error: &DeviceError,
        camera: Option<&MediaStream>,
        media: &mut MediaSession,
    ) -> Result<Option<StartOutcome>, RecordingError> {
        if !matches!(self.state, State::AwaitingScreen) {
            return Ok(None);
        }
        self.state = State::Idle;
        if let DeviceError::AccessDenied(_) = error {
            debug!("recorder: screen prompt declined");
            return Ok(None);
        }
        info!("recorder: screen capture failed ({error}), recording camera instead");
        let stream = camera.cloned().ok_or(RecordingError::NoStream)?;
        self.begin(stream, SourceKind::Camera, false, media).map(Some)
    }

    fn begin(
        &mut self,
        stream: MediaStream,
        source: SourceKind,
        dedicated: bool,
        media: &mut MediaSession,
    ) -> Result<StartOutcome, RecordingError> {
        let mime = select_container(self.backend.as_ref());
        if mime.is_none() {
            debug!("recorder: no preferred container supported, using backend default");
        }
        if let Err(e) = self.backend.start(&stream, mime, self.slice_interval) {
            warn!("recorder: start failed: {e}");
            self.state = State::Idle;
            if dedicated {
                media.stop_stream(&stream);
            }
            return Err(match e {
                RecordingError::Unsupported(_) => e,
                other => RecordingError::Unsupported(other.to_string()),
            });
        }
        info!("recorder: recording {:?} as {}", source, mime.unwrap_or("default"));
        self.slices.clear();
        self.state = State::Recording(Capture {
            stream,
            source,
            dedicated,
            mime,
        });
        Ok(StartOutcome::Recording(source))
    }

    /// One interval's worth of encoded data.
    pub fn on_slice(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        match self.state {
            State::Recording(_) | State::Finalizing(_) => self.slices.push(bytes),
            _ => debug!("recorder: dropping slice while idle"),
        }
    }

    /// Ask the backend to finalize. Cancels a recording still waiting on the screen prompt.
    pub fn stop(&mut self) -> Result<(), RecordingError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Recording(capture) => {
                self.backend.stop();
                self.state = State::Finalizing(capture);
                Ok(())
            }
            State::AwaitingScreen => Ok(()),
            other => {
                self.state = other;
                Err(RecordingError::NotRecording)
            }
        }
    }

    /// The backend finished. Assembles the slices; returns the pending artifact, or
    /// `None` when nothing was captured.
    pub fn on_stopped(
        &mut self,
        mime: Option<String>,
        media: &mut MediaSession,
    ) -> Option<&PendingRecording> {
        let capture = match std::mem::replace(&mut self.state, State::Idle) {
            State::Recording(c) | State::Finalizing(c) => c,
            other => {
                self.state = other;
                return None;
            }
        };
        if capture.dedicated {
            media.stop_stream(&capture.stream);
        }
        let slice_count = self.slices.len() as u32;
        let bytes = std::mem::take(&mut self.slices).concat();
        if bytes.is_empty() {
            info!("recorder: nothing captured, discarding");
            return None;
        }
        let mime = mime
            .filter(|m| !m.is_empty())
            .or_else(|| capture.mime.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
        info!("recorder: {} bytes pending save", bytes.len());
        self.pending = Some(PendingRecording {
            media: RecordingMedia { bytes, mime },
            source: capture.source,
            suggested_title: default_title(Local::now()),
            duration: duration_label(self.slice_interval * slice_count),
        });
        self.pending.as_ref()
    }

    /// Commit the pending artifact. `None` keeps the suggested title; a blank title
    /// becomes `Untitled Session`.
    pub fn save(&mut self, title: Option<&str>) -> Result<RecordedSession, RecordingError> {
        let pending = self.pending.take().ok_or(RecordingError::NothingPending)?;
        let title = match title.map(str::trim) {
            None => pending.suggested_title,
            Some("") => UNTITLED.to_string(),
            Some(t) => t.to_string(),
        };
        Ok(RecordedSession {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            media: pending.media,
            created_at: Local::now(),
            duration: pending.duration,
            source: pending.source,
        })
    }

    pub fn discard(&mut self) -> Result<(), RecordingError> {
        self.pending
            .take()
            .map(|_| ())
            .ok_or(RecordingError::NothingPending)
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &self.state)
            .field("slices", &self.slices.len())
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
