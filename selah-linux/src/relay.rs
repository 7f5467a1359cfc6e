//! Relay/discovery service: participants claim ids over TCP and the relay routes
//! link setup and link traffic between them by link id.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use selah_core::stream::{MediaStream, MediaTrack, TrackKind};
use selah_core::wire::{encode_frame, frame_len, HEADER_LEN};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Media,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum RejectReason {
    UnavailableId,
    PeerUnavailable { id: String },
    NotClaimed,
}

/// One relay protocol frame, JSON inside the length-prefixed framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RelayFrame {
    Claim {
        id: Option<String>,
    },
    Assigned {
        id: String,
    },
    Rejected {
        reason: RejectReason,
        #[serde(default)]
        link: Option<String>,
    },
    /// Dialer opens `link` to `target`; media dials carry the dialer's stream.
    Connect {
        link: String,
        target: String,
        kind: LinkKind,
        stream: Option<MediaStream>,
    },
    Incoming {
        link: String,
        from: String,
        kind: LinkKind,
        stream: Option<MediaStream>,
    },
    Answer {
        link: String,
        stream: Option<MediaStream>,
    },
    Payload {
        link: String,
        text: String,
    },
    TrackSwap {
        link: String,
        kind: TrackKind,
        track: Option<MediaTrack>,
    },
    Close {
        link: String,
    },
}

impl RelayFrame {
    /// Link the frame belongs to, if any.
    pub fn link(&self) -> Option<&str> {
        match self {
            RelayFrame::Claim { .. } | RelayFrame::Assigned { .. } => None,
            RelayFrame::Rejected { link, .. } => link.as_deref(),
            RelayFrame::Connect { link, .. }
            | RelayFrame::Incoming { link, .. }
            | RelayFrame::Answer { link, .. }
            | RelayFrame::Payload { link, .. }
            | RelayFrame::TrackSwap { link, .. }
            | RelayFrame::Close { link } => Some(link),
        }
    }
}

/// Read one frame. `Ok(None)` on clean EOF.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> std::io::Result<Option<RelayFrame>> {
    let mut header = [0u8; HEADER_LEN];
    match r.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = frame_len(header)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await?;
    let frame = serde_json::from_slice(&payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(frame))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &RelayFrame) -> std::io::Result<()> {
    let bytes = encode_frame(frame)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    w.write_all(&bytes).await?;
    w.flush().await
}

pub type ConnId = u64;

/// Routing table. Pure: returns the frames to deliver, keyed by connection.
#[derive(Debug, Default)]
pub struct RelayState {
    ids: HashMap<String, ConnId>,
    owners: HashMap<ConnId, String>,
    links: HashMap<String, (ConnId, ConnId)>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    fn other_end(&self, link: &str, from: ConnId) -> Option<ConnId> {
        match self.links.get(link) {
            Some(&(a, b)) if a == from => Some(b),
            Some(&(a, b)) if b == from => Some(a),
            _ => None,
        }
    }

    pub fn handle(&mut self, from: ConnId, frame: RelayFrame) -> Vec<(ConnId, RelayFrame)> {
        match frame {
            RelayFrame::Claim { id } => self.claim(from, id),
            RelayFrame::Connect {
                link,
                target,
                kind,
                stream,
            } => {
                let Some(from_id) = self.owners.get(&from).cloned() else {
                    return vec![(
                        from,
                        RelayFrame::Rejected {
                            reason: RejectReason::NotClaimed,
                            link: Some(link),
                        },
                    )];
                };
                let Some(&to) = self.ids.get(&target) else {
                    debug!("relay: {from_id} dialed unknown {target}");
                    return vec![(
                        from,
                        RelayFrame::Rejected {
                            reason: RejectReason::PeerUnavailable { id: target },
                            link: Some(link),
                        },
                    )];
                };
                if self.links.contains_key(&link) {
                    warn!("relay: duplicate link id {link} from {from_id}");
                    return Vec::new();
                }
                debug!("relay: {kind:?} link {link} {from_id} -> {target}");
                self.links.insert(link.clone(), (from, to));
                vec![(
                    to,
                    RelayFrame::Incoming {
                        link,
                        from: from_id,
                        kind,
                        stream,
                    },
                )]
            }
            RelayFrame::Answer { .. } | RelayFrame::Payload { .. } | RelayFrame::TrackSwap { .. } => {
                let to = frame.link().and_then(|l| self.other_end(l, from));
                match to {
                    Some(to) => vec![(to, frame)],
                    None => {
                        debug!("relay: frame for unknown link from conn {from}");
                        Vec::new()
                    }
                }
            }
            RelayFrame::Close { link } => match self.other_end(&link, from) {
                Some(to) => {
                    self.links.remove(&link);
                    vec![(to, RelayFrame::Close { link })]
                }
                None => Vec::new(),
            },
            other => {
                warn!("relay: unexpected frame from conn {from}: {other:?}");
                Vec::new()
            }
        }
    }

    fn claim(&mut self, from: ConnId, desired: Option<String>) -> Vec<(ConnId, RelayFrame)> {
        if let Some(existing) = self.owners.get(&from) {
            return vec![(from, RelayFrame::Assigned { id: existing.clone() })];
        }
        let id = match desired {
            Some(id) if self.ids.contains_key(&id) => {
                info!("relay: id {id} already claimed");
                return vec![(
                    from,
                    RelayFrame::Rejected {
                        reason: RejectReason::UnavailableId,
                        link: None,
                    },
                )];
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        info!("relay: conn {from} is {id}");
        self.ids.insert(id.clone(), from);
        self.owners.insert(from, id.clone());
        vec![(from, RelayFrame::Assigned { id })]
    }

    /// Connection gone: release its id and close its links on the far side.
    pub fn disconnect(&mut self, conn: ConnId) -> Vec<(ConnId, RelayFrame)> {
        if let Some(id) = self.owners.remove(&conn) {
            self.ids.remove(&id);
            info!("relay: {id} left");
        }
        let dead: Vec<String> = self
            .links
            .iter()
            .filter(|(_, ends)| ends.0 == conn || ends.1 == conn)
            .map(|(l, _)| l.clone())
            .collect();
        let mut out = Vec::new();
        for link in dead {
            if let Some((a, b)) = self.links.remove(&link) {
                let other = if a == conn { b } else { a };
                if other != conn {
                    out.push((other, RelayFrame::Close { link }));
                }
            }
        }
        out
    }
}

type Senders = Arc<Mutex<HashMap<ConnId, mpsc::UnboundedSender<RelayFrame>>>>;

/// Run the relay: accept participants on `port` until the listener fails.
pub async fn run_relay(port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("relay: listening on {}", listener.local_addr()?);
    serve(listener).await
}

pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    let state = Arc::new(Mutex::new(RelayState::new()));
    let senders: Senders = Arc::new(Mutex::new(HashMap::new()));
    let mut next_conn: ConnId = 1;
    loop {
        let (stream, addr) = listener.accept().await?;
        let conn = next_conn;
        next_conn += 1;
        debug!("relay: conn {conn} from {addr}");
        let state = state.clone();
        let senders = senders.clone();
        tokio::spawn(async move {
            run_connection(stream, conn, state, senders).await;
        });
    }
}

async fn route(senders: &Senders, out: Vec<(ConnId, RelayFrame)>) {
    let senders = senders.lock().await;
    for (to, frame) in out {
        if let Some(tx) = senders.get(&to) {
            let _ = tx.send(frame);
        }
    }
}

async fn run_connection(stream: TcpStream, conn: ConnId, state: Arc<Mutex<RelayState>>, senders: Senders) {
    let (tx, mut rx) = mpsc::unbounded_channel::<RelayFrame>();
    senders.lock().await.insert(conn, tx);
    let (mut reader, mut writer) = stream.into_split();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_frame(&mut writer, &frame).await.is_err() {
                break;
            }
        }
    });
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                debug!("relay: conn {conn} read error: {e}");
                break;
            }
        };
        let out = state.lock().await.handle(conn, frame);
        route(&senders, out).await;
    }
    senders.lock().await.remove(&conn);
    let out = state.lock().await.disconnect(conn);
    route(&senders, out).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use selah_core::stream::SourceKind;

    fn claim(state: &mut RelayState, conn: ConnId, id: Option<&str>) -> RelayFrame {
        let mut out = state.handle(
            conn,
            RelayFrame::Claim {
                id: id.map(str::to_string),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, conn);
        out.remove(0).1
    }

    fn connect(link: &str, target: &str, kind: LinkKind) -> RelayFrame {
        RelayFrame::Connect {
            link: link.into(),
            target: target.into(),
            kind,
            stream: None,
        }
    }

    #[test]
    fn claims_are_unique() {
        let mut s = RelayState::new();
        assert_eq!(
            claim(&mut s, 1, Some("ABCD-1234")),
            RelayFrame::Assigned {
                id: "ABCD-1234".into()
            }
        );
        assert_eq!(
            claim(&mut s, 2, Some("ABCD-1234")),
            RelayFrame::Rejected {
                reason: RejectReason::UnavailableId,
                link: None
            }
        );
        match claim(&mut s, 2, None) {
            RelayFrame::Assigned { id } => assert_eq!(id.len(), 36),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn connect_routes_incoming_with_stream() {
        let mut s = RelayState::new();
        claim(&mut s, 1, Some("host"));
        claim(&mut s, 2, Some("joiner"));
        let stream = MediaStream::new("cam", SourceKind::Camera, vec![]);
        let out = s.handle(
            2,
            RelayFrame::Connect {
                link: "l1".into(),
                target: "host".into(),
                kind: LinkKind::Media,
                stream: Some(stream.clone()),
            },
        );
        assert_eq!(
            out,
            vec![(
                1,
                RelayFrame::Incoming {
                    link: "l1".into(),
                    from: "joiner".into(),
                    kind: LinkKind::Media,
                    stream: Some(stream),
                }
            )]
        );

        let out = s.handle(
            1,
            RelayFrame::Answer {
                link: "l1".into(),
                stream: None,
            },
        );
        assert_eq!(out[0].0, 2);
        let out = s.handle(
            2,
            RelayFrame::Payload {
                link: "l1".into(),
                text: "{}".into(),
            },
        );
        assert_eq!(out[0].0, 1);
    }

    #[test]
    fn unknown_target_rejected() {
        let mut s = RelayState::new();
        claim(&mut s, 1, Some("joiner"));
        let out = s.handle(1, connect("l1", "nobody", LinkKind::Data));
        assert_eq!(
            out,
            vec![(
                1,
                RelayFrame::Rejected {
                    reason: RejectReason::PeerUnavailable { id: "nobody".into() },
                    link: Some("l1".into()),
                }
            )]
        );
        assert_eq!(s.links.len(), 0);
    }

    #[test]
    fn unclaimed_cannot_connect() {
        let mut s = RelayState::new();
        claim(&mut s, 1, Some("host"));
        let out = s.handle(9, connect("l1", "host", LinkKind::Data));
        assert!(matches!(
            &out[..],
            [(9, RelayFrame::Rejected { reason: RejectReason::NotClaimed, .. })]
        ));
    }

    #[test]
    fn frames_for_foreign_links_dropped() {
        let mut s = RelayState::new();
        claim(&mut s, 1, Some("a"));
        claim(&mut s, 2, Some("b"));
        claim(&mut s, 3, Some("c"));
        s.handle(1, connect("l1", "b", LinkKind::Data));
        let out = s.handle(
            3,
            RelayFrame::Payload {
                link: "l1".into(),
                text: "x".into(),
            },
        );
        assert!(out.is_empty());
    }

    #[test]
    fn disconnect_closes_links_and_frees_id() {
        let mut s = RelayState::new();
        claim(&mut s, 1, Some("host"));
        claim(&mut s, 2, Some("joiner"));
        s.handle(2, connect("m", "host", LinkKind::Media));
        s.handle(2, connect("d", "host", LinkKind::Data));

        let mut out = s.disconnect(1);
        out.sort_by(|a, b| format!("{:?}", a.1).cmp(&format!("{:?}", b.1)));
        assert_eq!(
            out,
            vec![
                (2, RelayFrame::Close { link: "d".into() }),
                (2, RelayFrame::Close { link: "m".into() }),
            ]
        );
        assert_eq!(s.links.len(), 0);
        assert!(!s.owners.contains_key(&1));
        assert!(matches!(claim(&mut s, 3, Some("host")), RelayFrame::Assigned { .. }));
    }

    #[test]
    fn explicit_close_forwards_once() {
        let mut s = RelayState::new();
        claim(&mut s, 1, Some("a"));
        claim(&mut s, 2, Some("b"));
        s.handle(1, connect("l", "b", LinkKind::Data));
        assert_eq!(
            s.handle(1, RelayFrame::Close { link: "l".into() }),
            vec![(2, RelayFrame::Close { link: "l".into() })]
        );
        assert!(s.handle(2, RelayFrame::Close { link: "l".into() }).is_empty());
    }

    #[test]
    fn frame_json_shape() {
        let json = serde_json::to_string(&RelayFrame::Rejected {
            reason: RejectReason::PeerUnavailable { id: "x".into() },
            link: None,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"op":"rejected","reason":{"code":"peer-unavailable","id":"x"},"link":null}"#
        );
    }

    #[tokio::test]
    async fn frames_survive_the_socket() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let frame = RelayFrame::Claim {
            id: Some("ABCD-1234".into()),
        };
        write_frame(&mut a, &frame).await.unwrap();
        drop(a);
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(frame));
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn relay_routes_between_sockets() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener));

        let mut host = TcpStream::connect(addr).await.unwrap();
        let mut joiner = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut host, &RelayFrame::Claim { id: Some("host".into()) })
            .await
            .unwrap();
        assert_eq!(
            read_frame(&mut host).await.unwrap(),
            Some(RelayFrame::Assigned { id: "host".into() })
        );
        write_frame(&mut joiner, &RelayFrame::Claim { id: None }).await.unwrap();
        let joiner_id = match read_frame(&mut joiner).await.unwrap() {
            Some(RelayFrame::Assigned { id }) => id,
            other => panic!("expected assignment, got {other:?}"),
        };

        write_frame(&mut joiner, &connect("d", "host", LinkKind::Data)).await.unwrap();
        assert_eq!(
            read_frame(&mut host).await.unwrap(),
            Some(RelayFrame::Incoming {
                link: "d".into(),
                from: joiner_id,
                kind: LinkKind::Data,
                stream: None,
            })
        );

        drop(joiner);
        assert_eq!(
            read_frame(&mut host).await.unwrap(),
            Some(RelayFrame::Close { link: "d".into() })
        );
    }
}
