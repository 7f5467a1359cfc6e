//! Headless capture: a virtual camera, no screen, no recording encoder.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, info};
use selah_core::{
    CaptureDevices, CapturePurpose, DeviceError, Event, MediaStream, MediaTrack, RecordingBackend,
    RecordingError, SourceKind, TrackKind,
};

/// Completions produced synchronously by local devices, drained by the participant loop.
pub type DeviceEvents = Rc<RefCell<VecDeque<Event>>>;

#[derive(Debug)]
pub struct VirtualDevices {
    events: DeviceEvents,
    next_stream: u32,
}

impl VirtualDevices {
    pub fn new(events: DeviceEvents) -> Self {
        Self {
            events,
            next_stream: 0,
        }
    }
}

impl CaptureDevices for VirtualDevices {
    fn request_camera(&mut self) {
        self.next_stream += 1;
        let id = format!("vcam-{}", self.next_stream);
        info!("devices: virtual camera {id}");
        let stream = MediaStream::new(
            id.clone(),
            SourceKind::Camera,
            vec![
                MediaTrack::new(format!("{id}-audio"), TrackKind::Audio),
                MediaTrack::new(format!("{id}-video"), TrackKind::Video),
            ],
        );
        self.events.borrow_mut().push_back(Event::CameraGranted(stream));
    }

    fn request_screen(&mut self, purpose: CapturePurpose) {
        self.events.borrow_mut().push_back(Event::CaptureFailed {
            purpose,
            error: DeviceError::Unavailable(SourceKind::Screen, "no display".into()),
        });
    }

    fn set_track_enabled(&mut self, track_id: &str, enabled: bool) {
        debug!("devices: {track_id} enabled={enabled}");
    }

    fn stop_track(&mut self, track_id: &str) {
        debug!("devices: stop {track_id}");
    }
}

/// Recording backend for hosts without an encoder.
#[derive(Debug, Default)]
pub struct NoEncoder;

impl RecordingBackend for NoEncoder {
    fn is_type_supported(&self, _mime: &str) -> bool {
        false
    }

    fn start(&mut self, _stream: &MediaStream, mime: Option<&str>, _timeslice: Duration) -> Result<(), RecordingError> {
        Err(RecordingError::Unsupported(mime.unwrap_or("any container").to_string()))
    }

    fn stop(&mut self) {}
}
