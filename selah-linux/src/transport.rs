//! Relay-backed substrate: one TCP connection to the relay carries signaling and
//! every media/data link as frames tagged with a link id.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, info, warn};
use selah_core::{
    DataLink, Event, LinkError, MediaLink, MediaStream, MediaTrack, ParticipantId, Substrate,
    SubstrateError, SubstrateEvent, TrackKind,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::relay::{read_frame, write_frame, LinkKind, RejectReason, RelayFrame};

/// What a relay connection task reports to the participant loop.
#[derive(Debug)]
pub enum RelayInbound {
    Frame { generation: u64, frame: RelayFrame },
    Closed { generation: u64 },
    ConnectFailed { generation: u64, error: String },
}

/// Starts a relay connection for `generation` and returns its writer.
pub type Connector = Box<dyn FnMut(u64) -> mpsc::UnboundedSender<RelayFrame>>;

/// Connector that dials `addr` over TCP on the current tokio runtime.
pub fn tcp_connector(addr: String, inbound: mpsc::UnboundedSender<RelayInbound>) -> Connector {
    Box::new(move |generation| {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_client(addr.clone(), generation, rx, inbound.clone()));
        tx
    })
}

async fn run_client(
    addr: String,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<RelayFrame>,
    inbound: mpsc::UnboundedSender<RelayInbound>,
) {
    let stream = match TcpStream::connect(&addr).await {
        Ok(s) => s,
        Err(e) => {
            warn!("transport: relay {addr} unreachable: {e}");
            let _ = inbound.send(RelayInbound::ConnectFailed {
                generation,
                error: e.to_string(),
            });
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    debug!("transport: connected to relay {addr} (gen {generation})");
    let (mut reader, mut writer) = stream.into_split();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!("transport: write failed: {e}");
                break;
            }
        }
    });
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if inbound.send(RelayInbound::Frame { generation, frame }).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("transport: read failed: {e}");
                break;
            }
        }
    }
    let _ = inbound.send(RelayInbound::Closed { generation });
}

#[derive(Debug)]
struct LinkEntry {
    peer: ParticipantId,
    kind: LinkKind,
    open: Rc<Cell<bool>>,
    remote: Option<MediaStream>,
}

#[derive(Debug, Default)]
struct Shared {
    writer: Option<mpsc::UnboundedSender<RelayFrame>>,
    links: HashMap<String, LinkEntry>,
}

impl Shared {
    fn send(&self, frame: RelayFrame) -> Result<(), LinkError> {
        let tx = self.writer.as_ref().ok_or(LinkError::Closed)?;
        tx.send(frame)
            .map_err(|_| LinkError::Transport("relay connection closed".into()))
    }
}

pub struct RelaySubstrate {
    connect: Connector,
    generation: u64,
    shared: Rc<RefCell<Shared>>,
}

impl RelaySubstrate {
    pub fn new(connect: Connector) -> Self {
        Self {
            connect,
            generation: 0,
            shared: Rc::new(RefCell::new(Shared::default())),
        }
    }

    fn start(&mut self, id: Option<&ParticipantId>) {
        self.generation += 1;
        let tx = (self.connect)(self.generation);
        let _ = tx.send(RelayFrame::Claim {
            id: id.map(|i| i.to_string()),
        });
        self.shared.borrow_mut().writer = Some(tx);
    }

    fn new_link(&self, link: String, peer: ParticipantId, kind: LinkKind, open: bool) -> Rc<Cell<bool>> {
        let flag = Rc::new(Cell::new(open));
        self.shared.borrow_mut().links.insert(
            link,
            LinkEntry {
                peer,
                kind,
                open: flag.clone(),
                remote: None,
            },
        );
        flag
    }

    /// Drop every link, reporting each as closed.
    fn drop_links(&mut self) -> Vec<Event> {
        let links: Vec<LinkEntry> = self.shared.borrow_mut().links.drain().map(|(_, e)| e).collect();
        links.into_iter().map(closed_event).collect()
    }

    /// Turn one inbound report into controller events. Reports from superseded
    /// connections are ignored.
    pub fn translate(&mut self, inbound: RelayInbound) -> Vec<Event> {
        match inbound {
            RelayInbound::Frame { generation, frame } if generation == self.generation => {
                self.on_frame(frame)
            }
            RelayInbound::Closed { generation } if generation == self.generation => {
                info!("transport: relay connection lost");
                self.shared.borrow_mut().writer = None;
                let mut events = self.drop_links();
                events.push(Event::Signaling(SubstrateEvent::Disconnected));
                events
            }
            RelayInbound::ConnectFailed { generation, error } if generation == self.generation => {
                self.shared.borrow_mut().writer = None;
                vec![Event::Signaling(SubstrateEvent::Error(SubstrateError::Other(
                    error,
                )))]
            }
            other => {
                debug!("transport: stale report {other:?}");
                Vec::new()
            }
        }
    }

    fn on_frame(&mut self, frame: RelayFrame) -> Vec<Event> {
        match frame {
            RelayFrame::Assigned { id } => {
                vec![Event::Signaling(SubstrateEvent::Opened(ParticipantId::new(id)))]
            }
            RelayFrame::Rejected { reason, link } => {
                let mut events = vec![Event::Signaling(SubstrateEvent::Error(match reason {
                    RejectReason::UnavailableId => SubstrateError::UnavailableId,
                    RejectReason::PeerUnavailable { id } => {
                        SubstrateError::PeerUnavailable(ParticipantId::new(id))
                    }
                    RejectReason::NotClaimed => SubstrateError::Other("not claimed".into()),
                }))];
                let entry = link.and_then(|l| self.shared.borrow_mut().links.remove(&l));
                events.extend(entry.map(closed_event));
                events
            }
            RelayFrame::Incoming {
                link,
                from,
                kind,
                stream,
            } => self.on_incoming(link, ParticipantId::new(from), kind, stream),
            RelayFrame::Answer { link, stream } => {
                let mut shared = self.shared.borrow_mut();
                let Some(entry) = shared.links.get_mut(&link) else {
                    return Vec::new();
                };
                match entry.kind {
                    LinkKind::Data => {
                        entry.open.set(true);
                        vec![Event::DataOpened(entry.peer.clone())]
                    }
                    LinkKind::Media => {
                        entry.remote = stream.clone();
                        stream
                            .map(|stream| Event::RemoteStream {
                                peer: entry.peer.clone(),
                                stream,
                            })
                            .into_iter()
                            .collect()
                    }
                }
            }
            RelayFrame::Payload { link, text } => {
                let shared = self.shared.borrow();
                match shared.links.get(&link) {
                    Some(entry) if entry.kind == LinkKind::Data && entry.open.get() => {
                        vec![Event::DataReceived {
                            peer: entry.peer.clone(),
                            payload: text.into_bytes(),
                        }]
                    }
                    _ => Vec::new(),
                }
            }
            RelayFrame::TrackSwap { link, kind, track } => {
                let mut shared = self.shared.borrow_mut();
                let Some(entry) = shared.links.get_mut(&link) else {
                    return Vec::new();
                };
                let Some(remote) = entry.remote.as_mut() else {
                    return Vec::new();
                };
                remote.tracks.retain(|t| t.kind != kind);
                remote.tracks.extend(track);
                vec![Event::RemoteStream {
                    peer: entry.peer.clone(),
                    stream: remote.clone(),
                }]
            }
            RelayFrame::Close { link } => {
                let entry = self.shared.borrow_mut().links.remove(&link);
                entry.map(closed_event).into_iter().collect()
            }
            other => {
                warn!("transport: unexpected frame {other:?}");
                Vec::new()
            }
        }
    }

    fn on_incoming(
        &mut self,
        link: String,
        from: ParticipantId,
        kind: LinkKind,
        stream: Option<MediaStream>,
    ) -> Vec<Event> {
        debug!("transport: incoming {kind:?} link {link} from {from}");
        match kind {
            LinkKind::Media => {
                self.new_link(link.clone(), from.clone(), kind, true);
                let handle = RelayMediaLink {
                    link: link.clone(),
                    peer: from.clone(),
                    shared: self.shared.clone(),
                };
                let mut events = vec![Event::Signaling(SubstrateEvent::IncomingMedia(Box::new(handle)))];
                if let Some(stream) = stream {
                    if let Some(entry) = self.shared.borrow_mut().links.get_mut(&link) {
                        entry.remote = Some(stream.clone());
                    }
                    events.push(Event::RemoteStream { peer: from, stream });
                }
                events
            }
            LinkKind::Data => {
                let open = self.new_link(link.clone(), from.clone(), kind, true);
                if let Err(e) = self.shared.borrow().send(RelayFrame::Answer {
                    link: link.clone(),
                    stream: None,
                }) {
                    debug!("transport: answering data link {link} failed: {e}");
                }
                let handle = RelayDataLink {
                    link,
                    peer: from.clone(),
                    open,
                    shared: self.shared.clone(),
                };
                vec![
                    Event::Signaling(SubstrateEvent::IncomingData(Box::new(handle))),
                    Event::DataOpened(from),
                ]
            }
        }
    }
}

fn closed_event(entry: LinkEntry) -> Event {
    entry.open.set(false);
    match entry.kind {
        LinkKind::Media => Event::MediaClosed(entry.peer),
        LinkKind::Data => Event::DataClosed(entry.peer),
    }
}

impl Substrate for RelaySubstrate {
    fn open(&mut self, desired: Option<&ParticipantId>) {
        info!("transport: claiming {}", desired.map(|d| d.as_str()).unwrap_or("<any>"));
        self.start(desired);
    }

    fn reconnect(&mut self, id: &ParticipantId) {
        info!("transport: reconnecting as {id}");
        self.start(Some(id));
    }

    fn dial(&mut self, target: &ParticipantId, local: &MediaStream) -> Box<dyn MediaLink> {
        let link = uuid::Uuid::new_v4().to_string();
        self.new_link(link.clone(), target.clone(), LinkKind::Media, true);
        if let Err(e) = self.shared.borrow().send(RelayFrame::Connect {
            link: link.clone(),
            target: target.to_string(),
            kind: LinkKind::Media,
            stream: Some(local.clone()),
        }) {
            debug!("transport: dial {target} not sent: {e}");
        }
        Box::new(RelayMediaLink {
            link,
            peer: target.clone(),
            shared: self.shared.clone(),
        })
    }

    fn open_data(&mut self, target: &ParticipantId) -> Box<dyn DataLink> {
        let link = uuid::Uuid::new_v4().to_string();
        let open = self.new_link(link.clone(), target.clone(), LinkKind::Data, false);
        if let Err(e) = self.shared.borrow().send(RelayFrame::Connect {
            link: link.clone(),
            target: target.to_string(),
            kind: LinkKind::Data,
            stream: None,
        }) {
            debug!("transport: data dial {target} not sent: {e}");
        }
        Box::new(RelayDataLink {
            link,
            peer: target.clone(),
            open,
            shared: self.shared.clone(),
        })
    }

    fn destroy(&mut self) {
        // superseding the generation silences the old connection's reports
        self.generation += 1;
        let mut shared = self.shared.borrow_mut();
        shared.writer = None;
        for (_, entry) in shared.links.drain() {
            entry.open.set(false);
        }
    }
}

impl fmt::Debug for RelaySubstrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("RelaySubstrate")
            .field("generation", &self.generation)
            .field("connected", &shared.writer.is_some())
            .field("links", &shared.links.len())
            .finish()
    }
}

/// Shared handle: the controller drives the substrate, the participant loop feeds it.
#[derive(Debug, Clone)]
pub struct RelayHandle(Rc<RefCell<RelaySubstrate>>);

impl RelayHandle {
    pub fn new(substrate: RelaySubstrate) -> Self {
        Self(Rc::new(RefCell::new(substrate)))
    }

    pub fn translate(&self, inbound: RelayInbound) -> Vec<Event> {
        self.0.borrow_mut().translate(inbound)
    }
}

impl Substrate for RelayHandle {
    fn open(&mut self, desired: Option<&ParticipantId>) {
        self.0.borrow_mut().open(desired)
    }

    fn reconnect(&mut self, id: &ParticipantId) {
        self.0.borrow_mut().reconnect(id)
    }

    fn dial(&mut self, target: &ParticipantId, local: &MediaStream) -> Box<dyn MediaLink> {
        self.0.borrow_mut().dial(target, local)
    }

    fn open_data(&mut self, target: &ParticipantId) -> Box<dyn DataLink> {
        self.0.borrow_mut().open_data(target)
    }

    fn destroy(&mut self) {
        self.0.borrow_mut().destroy()
    }
}

struct RelayMediaLink {
    link: String,
    peer: ParticipantId,
    shared: Rc<RefCell<Shared>>,
}

impl RelayMediaLink {
    fn is_live(&self) -> bool {
        self.shared.borrow().links.contains_key(&self.link)
    }
}

impl MediaLink for RelayMediaLink {
    fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    fn answer(&mut self, local: &MediaStream) -> Result<(), LinkError> {
        if !self.is_live() {
            return Err(LinkError::Closed);
        }
        self.shared.borrow().send(RelayFrame::Answer {
            link: self.link.clone(),
            stream: Some(local.clone()),
        })
    }

    fn replace_track(&mut self, kind: TrackKind, track: Option<&MediaTrack>) -> Result<(), LinkError> {
        if !self.is_live() {
            return Err(LinkError::Closed);
        }
        self.shared.borrow().send(RelayFrame::TrackSwap {
            link: self.link.clone(),
            kind,
            track: track.cloned(),
        })
    }

    fn close(&mut self) {
        let mut shared = self.shared.borrow_mut();
        if shared.links.remove(&self.link).is_some() {
            let _ = shared.send(RelayFrame::Close {
                link: self.link.clone(),
            });
        }
    }
}

impl fmt::Debug for RelayMediaLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayMediaLink")
            .field("link", &self.link)
            .field("peer", &self.peer)
            .finish()
    }
}

struct RelayDataLink {
    link: String,
    peer: ParticipantId,
    open: Rc<Cell<bool>>,
    shared: Rc<RefCell<Shared>>,
}

impl DataLink for RelayDataLink {
    fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if !self.open.get() {
            return Err(LinkError::Closed);
        }
        let text = std::str::from_utf8(payload)
            .map_err(|e| LinkError::Transport(e.to_string()))?
            .to_string();
        self.shared.borrow().send(RelayFrame::Payload {
            link: self.link.clone(),
            text,
        })
    }

    fn close(&mut self) {
        self.open.set(false);
        let mut shared = self.shared.borrow_mut();
        if shared.links.remove(&self.link).is_some() {
            let _ = shared.send(RelayFrame::Close {
                link: self.link.clone(),
            });
        }
    }
}

impl fmt::Debug for RelayDataLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayDataLink")
            .field("link", &self.link)
            .field("peer", &self.peer)
            .field("open", &self.open.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selah_core::SourceKind;

    type Wires = Rc<RefCell<Vec<mpsc::UnboundedReceiver<RelayFrame>>>>;

    fn substrate() -> (RelaySubstrate, Wires) {
        let wires: Wires = Rc::new(RefCell::new(Vec::new()));
        let w = wires.clone();
        let connect: Connector = Box::new(move |_| {
            let (tx, rx) = mpsc::unbounded_channel();
            w.borrow_mut().push(rx);
            tx
        });
        (RelaySubstrate::new(connect), wires)
    }

    fn sent(wires: &Wires) -> Vec<RelayFrame> {
        let mut wires = wires.borrow_mut();
        let rx = wires.last_mut().unwrap();
        let mut out = Vec::new();
        while let Ok(f) = rx.try_recv() {
            out.push(f);
        }
        out
    }

    fn frame(s: &RelaySubstrate, frame: RelayFrame) -> RelayInbound {
        RelayInbound::Frame {
            generation: s.generation,
            frame,
        }
    }

    fn cam(id: &str) -> MediaStream {
        MediaStream::new(
            id,
            SourceKind::Camera,
            vec![
                MediaTrack::new(format!("{id}-audio"), TrackKind::Audio),
                MediaTrack::new(format!("{id}-video"), TrackKind::Video),
            ],
        )
    }

    #[test]
    fn open_claims_and_reports_assignment() {
        let (mut s, wires) = substrate();
        s.open(Some(&ParticipantId::new("ABCD")));
        assert_eq!(sent(&wires), vec![RelayFrame::Claim { id: Some("ABCD".into()) }]);
        let events = s.translate(frame(&s, RelayFrame::Assigned { id: "ABCD".into() }));
        assert!(matches!(
            &events[..],
            [Event::Signaling(SubstrateEvent::Opened(id))] if id.as_str() == "ABCD"
        ));
    }

    #[test]
    fn taken_id_maps_to_unavailable() {
        let (mut s, _wires) = substrate();
        s.open(Some(&ParticipantId::new("ABCD")));
        let events = s.translate(frame(
            &s,
            RelayFrame::Rejected {
                reason: RejectReason::UnavailableId,
                link: None,
            },
        ));
        assert!(matches!(
            &events[..],
            [Event::Signaling(SubstrateEvent::Error(SubstrateError::UnavailableId))]
        ));
    }

    #[test]
    fn dial_then_answer_yields_remote_stream() {
        let (mut s, wires) = substrate();
        s.open(None);
        sent(&wires);
        let host = ParticipantId::new("host");
        let _link = s.dial(&host, &cam("me"));
        let link = match &sent(&wires)[..] {
            [RelayFrame::Connect { link, target, kind: LinkKind::Media, stream: Some(st) }] => {
                assert_eq!(target, "host");
                assert_eq!(st.id, "me");
                link.clone()
            }
            other => panic!("unexpected {other:?}"),
        };
        let events = s.translate(frame(
            &s,
            RelayFrame::Answer {
                link: link.clone(),
                stream: Some(cam("host-cam")),
            },
        ));
        assert!(matches!(
            &events[..],
            [Event::RemoteStream { peer, stream }] if peer == &host && stream.id == "host-cam"
        ));

        let events = s.translate(frame(
            &s,
            RelayFrame::TrackSwap {
                link,
                kind: TrackKind::Video,
                track: Some(MediaTrack::new("scr-video", TrackKind::Video)),
            },
        ));
        match &events[..] {
            [Event::RemoteStream { stream, .. }] => {
                assert_eq!(stream.video_track().unwrap().id, "scr-video");
                assert_eq!(stream.audio_track().unwrap().id, "host-cam-audio");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn data_link_opens_on_answer() {
        let (mut s, wires) = substrate();
        s.open(None);
        sent(&wires);
        let mut data = s.open_data(&ParticipantId::new("host"));
        assert!(!data.is_open());
        assert!(matches!(data.send(b"{}"), Err(LinkError::Closed)));
        let link = match &sent(&wires)[..] {
            [RelayFrame::Connect { link, kind: LinkKind::Data, .. }] => link.clone(),
            other => panic!("unexpected {other:?}"),
        };
        let events = s.translate(frame(&s, RelayFrame::Answer { link: link.clone(), stream: None }));
        assert!(matches!(&events[..], [Event::DataOpened(p)] if p.as_str() == "host"));
        assert!(data.is_open());
        data.send(br#"{"type":"HAND"}"#).unwrap();
        assert_eq!(
            sent(&wires),
            vec![RelayFrame::Payload {
                link,
                text: r#"{"type":"HAND"}"#.into()
            }]
        );
    }

    #[test]
    fn incoming_data_is_auto_answered() {
        let (mut s, wires) = substrate();
        s.open(Some(&ParticipantId::new("host")));
        sent(&wires);
        let events = s.translate(frame(
            &s,
            RelayFrame::Incoming {
                link: "d1".into(),
                from: "joiner".into(),
                kind: LinkKind::Data,
                stream: None,
            },
        ));
        assert_eq!(sent(&wires), vec![RelayFrame::Answer { link: "d1".into(), stream: None }]);
        match &events[..] {
            [Event::Signaling(SubstrateEvent::IncomingData(link)), Event::DataOpened(p)] => {
                assert!(link.is_open());
                assert_eq!(p.as_str(), "joiner");
            }
            other => panic!("unexpected {other:?}"),
        }
        let events = s.translate(frame(&s, RelayFrame::Payload { link: "d1".into(), text: "hi".into() }));
        assert!(matches!(
            &events[..],
            [Event::DataReceived { payload, .. }] if payload == b"hi"
        ));
    }

    #[test]
    fn incoming_media_carries_dialer_stream() {
        let (mut s, wires) = substrate();
        s.open(Some(&ParticipantId::new("host")));
        sent(&wires);
        let events = s.translate(frame(
            &s,
            RelayFrame::Incoming {
                link: "m1".into(),
                from: "joiner".into(),
                kind: LinkKind::Media,
                stream: Some(cam("joiner-cam")),
            },
        ));
        let mut link = match events.into_iter().next() {
            Some(Event::Signaling(SubstrateEvent::IncomingMedia(link))) => link,
            other => panic!("unexpected {other:?}"),
        };
        link.answer(&cam("host-cam")).unwrap();
        assert!(matches!(
            &sent(&wires)[..],
            [RelayFrame::Answer { link, stream: Some(st) }] if link == "m1" && st.id == "host-cam"
        ));
        link.close();
        assert_eq!(sent(&wires), vec![RelayFrame::Close { link: "m1".into() }]);
        assert!(matches!(link.answer(&cam("host-cam")), Err(LinkError::Closed)));
    }

    #[test]
    fn remote_close_and_unreachable_peer() {
        let (mut s, wires) = substrate();
        s.open(None);
        sent(&wires);
        let host = ParticipantId::new("host");
        let _m = s.dial(&host, &cam("me"));
        let data = s.open_data(&host);
        let links: Vec<String> = sent(&wires)
            .into_iter()
            .filter_map(|f| match f {
                RelayFrame::Connect { link, .. } => Some(link),
                _ => None,
            })
            .collect();
        let events = s.translate(frame(
            &s,
            RelayFrame::Rejected {
                reason: RejectReason::PeerUnavailable { id: "host".into() },
                link: Some(links[0].clone()),
            },
        ));
        assert!(matches!(
            &events[..],
            [
                Event::Signaling(SubstrateEvent::Error(SubstrateError::PeerUnavailable(_))),
                Event::MediaClosed(_)
            ]
        ));
        let events = s.translate(frame(&s, RelayFrame::Close { link: links[1].clone() }));
        assert!(matches!(&events[..], [Event::DataClosed(p)] if p == &host));
        assert!(!data.is_open());
    }

    #[test]
    fn lost_connection_closes_links_then_disconnects() {
        let (mut s, wires) = substrate();
        s.open(None);
        let _m = s.dial(&ParticipantId::new("host"), &cam("me"));
        let events = s.translate(RelayInbound::Closed { generation: s.generation });
        assert!(matches!(
            &events[..],
            [Event::MediaClosed(_), Event::Signaling(SubstrateEvent::Disconnected)]
        ));

        s.reconnect(&ParticipantId::new("me"));
        assert_eq!(wires.borrow().len(), 2);
        assert_eq!(sent(&wires), vec![RelayFrame::Claim { id: Some("me".into()) }]);
    }

    #[test]
    fn stale_generations_ignored() {
        let (mut s, _wires) = substrate();
        s.open(None);
        let old = s.generation;
        s.destroy();
        assert!(s.translate(RelayInbound::Closed { generation: old }).is_empty());
        assert!(s
            .translate(RelayInbound::Frame {
                generation: old,
                frame: RelayFrame::Assigned { id: "x".into() }
            })
            .is_empty());
    }

    #[test]
    fn connect_failure_reports_error() {
        let (mut s, _wires) = substrate();
        s.open(None);
        let events = s.translate(RelayInbound::ConnectFailed {
            generation: s.generation,
            error: "refused".into(),
        });
        assert!(matches!(
            &events[..],
            [Event::Signaling(SubstrateEvent::Error(SubstrateError::Other(m)))] if m == "refused"
        ));
    }
}
