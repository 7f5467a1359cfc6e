//! Media session manager: owns local capture and the outbound stream.
//!
//! Only this component starts or stops device tracks. Links read the outbound
//! tracks and get their senders swapped in place; the recorder reads them.

use std::fmt;

use log::{debug, info, warn};

use crate::registry::PeerRegistry;
use crate::stream::{MediaStream, SourceKind, TrackKind};

/// Why a capture was requested; screen grants are routed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePurpose {
    /// Becomes the outbound stream sent to peers.
    Outbound,
    /// Dedicated to the recorder, never sent to peers.
    Recording,
}

/// Local capture devices. Requests complete asynchronously: the host reports
/// grants, denials and externally ended tracks as events.
pub trait CaptureDevices: fmt::Debug {
    fn request_camera(&mut self);
    fn request_screen(&mut self, purpose: CapturePurpose);
    fn set_track_enabled(&mut self, track_id: &str, enabled: bool);
    fn stop_track(&mut self, track_id: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The user declined the permission prompt. Expected, not a fault.
    #[error("{0:?} access denied")]
    AccessDenied(SourceKind),
    #[error("{0:?} unavailable: {1}")]
    Unavailable(SourceKind, String),
}

impl DeviceError {
    pub fn device(&self) -> SourceKind {
        match self {
            DeviceError::AccessDenied(s) | DeviceError::Unavailable(s, _) => *s,
        }
    }

    pub fn status_text(&self) -> String {
        match self {
            DeviceError::AccessDenied(SourceKind::Camera) => "Camera/Mic access denied".to_string(),
            DeviceError::AccessDenied(SourceKind::Screen) => "Screen sharing cancelled".to_string(),
            DeviceError::Unavailable(SourceKind::Camera, e) => format!("Camera unavailable: {e}"),
            DeviceError::Unavailable(SourceKind::Screen, e) => format!("Screen capture unavailable: {e}"),
        }
    }
}

pub struct MediaSession {
    devices: Box<dyn CaptureDevices>,
    outbound: Option<MediaStream>,
    camera_pending: bool,
    screen_pending: bool,
    muted: bool,
    video_off: bool,
    released: bool,
}

impl MediaSession {
    pub fn new(devices: Box<dyn CaptureDevices>) -> Self {
        Self {
            devices,
            outbound: None,
            camera_pending: false,
            screen_pending: false,
            muted: false,
            video_off: false,
            released: false,
        }
    }

    /// Current outbound stream (camera, or screen video plus audio).
    pub fn outbound(&self) -> Option<&MediaStream> {
        self.outbound.as_ref()
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.outbound
            .as_ref()
            .map(|s| s.source == SourceKind::Screen)
            .unwrap_or(false)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_video_off(&self) -> bool {
        self.video_off
    }

    pub fn is_camera_pending(&self) -> bool {
        self.camera_pending
    }

    /// Ask for camera + microphone. No-op while a camera request is outstanding.
    pub fn acquire_camera(&mut self) {
        if self.camera_pending {
            return;
        }
        self.camera_pending = true;
        self.released = false;
        self.devices.request_camera();
    }

    /// Ask for a screen capture to become the outbound stream.
    pub fn acquire_screen(&mut self) {
        if self.screen_pending || self.is_screen_sharing() {
            return;
        }
        self.screen_pending = true;
        self.devices.request_screen(CapturePurpose::Outbound);
    }

    /// Ask for a screen capture dedicated to recording.
    pub fn request_recording_screen(&mut self) {
        self.devices.request_screen(CapturePurpose::Recording);
    }

    /// Camera granted. Supersedes any previous outbound stream and swaps it into
    /// every open media link. Returns false if the grant arrived after release.
    pub fn on_camera_granted(&mut self, mut stream: MediaStream, peers: &mut PeerRegistry) -> bool {
        self.camera_pending = false;
        if self.released {
            debug!("media: camera granted after release, stopping it");
            self.stop_stream(&stream);
            return false;
        }
        self.apply_enabled_flags(&mut stream);
        let previous = self.outbound.replace(stream);
        if let Some(prev) = previous {
            self.stop_stream(&prev);
            if let Some(out) = self.outbound.clone() {
                self.replace_outbound_video(&out, peers);
            }
        }
        info!("media: camera is outbound");
        true
    }

    /// Screen granted for sharing. The camera video stops; the camera's audio stays
    /// on the outbound stream when the screen capture brings no audio of its own.
    pub fn on_screen_granted(&mut self, screen: MediaStream, peers: &mut PeerRegistry) -> bool {
        self.screen_pending = false;
        if self.released {
            self.stop_stream(&screen);
            return false;
        }
        let mut outbound = screen;
        if let Some(prev) = self.outbound.take() {
            let keep_audio = outbound.audio_track().is_none();
            for track in &prev.tracks {
                if keep_audio && track.kind == TrackKind::Audio {
                    outbound.tracks.push(track.clone());
                } else {
                    self.devices.stop_track(&track.id);
                }
            }
        }
        self.apply_enabled_flags(&mut outbound);
        self.replace_outbound_video(&outbound, peers);
        self.outbound = Some(outbound);
        info!("media: screen share is outbound");
        true
    }

    /// A capture request was declined or failed.
    pub fn on_capture_failed(&mut self, purpose: CapturePurpose, error: &DeviceError) {
        match (error.device(), purpose) {
            (SourceKind::Camera, _) => {
                self.camera_pending = false;
                warn!("media: {error}");
            }
            (SourceKind::Screen, CapturePurpose::Outbound) => {
                self.screen_pending = false;
                debug!("media: screen share not started: {error}");
            }
            (SourceKind::Screen, CapturePurpose::Recording) => {}
        }
    }

    /// Swap every open media link's video sender to `stream`'s video track without
    /// renegotiating. Audio is swapped only if `stream` carries audio.
    pub fn replace_outbound_video(&mut self, stream: &MediaStream, peers: &mut PeerRegistry) -> usize {
        let video = stream.video_track();
        let audio = stream.audio_track();
        let mut swapped = 0;
        for link in peers.media_links_mut() {
            if let Err(e) = link.replace_track(TrackKind::Video, video) {
                warn!("media: video swap to {} failed: {e}", link.peer());
                continue;
            }
            if let Some(a) = audio {
                if let Err(e) = link.replace_track(TrackKind::Audio, Some(a)) {
                    warn!("media: audio swap to {} failed: {e}", link.peer());
                }
            }
            swapped += 1;
        }
        swapped
    }

    /// Mute (audio) or black out (video) by disabling the device track in place.
    pub fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) {
        match kind {
            TrackKind::Audio => self.muted = !enabled,
            TrackKind::Video => self.video_off = !enabled,
        }
        let Some(out) = self.outbound.as_mut() else {
            return;
        };
        for track in out.tracks.iter_mut().filter(|t| t.kind == kind) {
            track.enabled = enabled;
            self.devices.set_track_enabled(&track.id, enabled);
        }
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.set_track_enabled(TrackKind::Audio, self.muted);
        self.muted
    }

    pub fn toggle_video(&mut self) -> bool {
        self.set_track_enabled(TrackKind::Video, self.video_off);
        self.video_off
    }

    /// A device track ended outside our control. When it is the shared screen's video
    /// (user pressed "stop sharing" in the browser chrome), revert to the camera.
    /// Returns true if a revert was started.
    pub fn on_track_ended(&mut self, track_id: &str) -> bool {
        let is_screen_video = self
            .outbound
            .as_ref()
            .filter(|s| s.source == SourceKind::Screen)
            .and_then(|s| s.video_track())
            .map(|t| t.id == track_id)
            .unwrap_or(false);
        if is_screen_video {
            info!("media: screen share ended externally, reverting to camera");
            self.acquire_camera();
            return true;
        }
        if self
            .outbound
            .as_ref()
            .map(|s| s.has_track(track_id))
            .unwrap_or(false)
        {
            warn!("media: outbound track {track_id} ended");
        }
        false
    }

    /// Stop every track of a stream this session handed out.
    pub fn stop_stream(&mut self, stream: &MediaStream) {
        for track in &stream.tracks {
            self.devices.stop_track(&track.id);
        }
    }

    /// Stop all device tracks. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Some(out) = self.outbound.take() {
            self.stop_stream(&out);
        }
        self.released = true;
        self.camera_pending = false;
        self.screen_pending = false;
        self.muted = false;
        self.video_off = false;
        info!("media: released");
    }

    fn apply_enabled_flags(&mut self, stream: &mut MediaStream) {
        for track in &mut stream.tracks {
            let enabled = match track.kind {
                TrackKind::Audio => !self.muted,
                TrackKind::Video => !self.video_off,
            };
            if track.enabled != enabled {
                track.enabled = enabled;
                self.devices.set_track_enabled(&track.id, enabled);
            }
        }
    }
}

impl fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSession")
            .field("outbound", &self.outbound.as_ref().map(|s| &s.id))
            .field("muted", &self.muted)
            .field("video_off", &self.video_off)
            .field("released", &self.released)
            .finish()
    }
}
