//! Signaling client: claims an identifier on the relay substrate and brokers link setup.

use std::fmt;

use log::{debug, info, warn};

use crate::ids::ParticipantId;
use crate::link::{DataLink, MediaLink};
use crate::stream::MediaStream;

/// Discovery/relay service. Requests are fire-and-forget; completions come back
/// from the host as [`SubstrateEvent`]s.
pub trait Substrate: fmt::Debug {
    /// Claim `desired` exactly, or let the substrate assign an id when `None`.
    fn open(&mut self, desired: Option<&ParticipantId>);

    /// Re-open after a disconnect, claiming the same id again.
    fn reconnect(&mut self, id: &ParticipantId);

    /// Dial a media link carrying `local`. The handle is live immediately; the remote
    /// stream arrives once the far side answers.
    fn dial(&mut self, target: &ParticipantId, local: &MediaStream) -> Box<dyn MediaLink>;

    /// Start a data link. The handle reports `is_open` once the handshake completes.
    fn open_data(&mut self, target: &ParticipantId) -> Box<dyn DataLink>;

    /// Drop the claimed id and every pending attempt.
    fn destroy(&mut self);
}

/// What the substrate reports back to the client.
#[derive(Debug)]
pub enum SubstrateEvent {
    Opened(ParticipantId),
    IncomingMedia(Box<dyn MediaLink>),
    IncomingData(Box<dyn DataLink>),
    Disconnected,
    Error(SubstrateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    /// The requested id is already claimed.
    UnavailableId,
    /// Dialed id does not exist.
    PeerUnavailable(ParticipantId),
    /// Anything else, with the substrate's description.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingState {
    Idle,
    Opening { desired: Option<ParticipantId> },
    Ready(ParticipantId),
    Reconnecting(ParticipantId),
    Lost,
    Destroyed,
}

/// Events surfaced to the call controller.
#[derive(Debug)]
pub enum SignalingEvent {
    Ready(ParticipantId),
    Reconnecting,
    Reconnected(ParticipantId),
    IncomingMedia(Box<dyn MediaLink>),
    IncomingData(Box<dyn DataLink>),
    Failed(SignalingError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("identifier {0} already taken")]
    IdentifierTaken(String),
    #[error("peer {0} unreachable")]
    PeerUnreachable(String),
    #[error("connection to signaling service lost")]
    ConnectionLost,
    #[error("signaling not ready")]
    NotReady,
    #[error("signaling error: {0}")]
    Substrate(String),
}

impl SignalingError {
    /// Human-readable status line for the call UI.
    pub fn status_text(&self) -> String {
        match self {
            SignalingError::IdentifierTaken(_) => "ID Taken".to_string(),
            SignalingError::PeerUnreachable(_) => "Room Not Found".to_string(),
            SignalingError::ConnectionLost => "Connection Lost".to_string(),
            SignalingError::NotReady => "Not Connected".to_string(),
            SignalingError::Substrate(e) => format!("Error: {e}"),
        }
    }
}

pub struct SignalingClient {
    substrate: Box<dyn Substrate>,
    state: SignalingState,
    listening: bool,
    /// One reconnect per disconnect; restored once the id is re-claimed.
    reconnect_spent: bool,
}

impl SignalingClient {
    pub fn new(substrate: Box<dyn Substrate>) -> Self {
        Self {
            substrate,
            state: SignalingState::Idle,
            listening: false,
            reconnect_spent: false,
        }
    }

    pub fn state(&self) -> &SignalingState {
        &self.state
    }

    /// Our id on the substrate, once claimed.
    pub fn local_id(&self) -> Option<&ParticipantId> {
        match &self.state {
            SignalingState::Ready(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(
            self.state,
            SignalingState::Idle | SignalingState::Destroyed
        )
    }

    /// Claim `desired` (host) or ask for an assigned id (joiner).
    pub fn open(&mut self, desired: Option<ParticipantId>) {
        info!("signaling: opening (desired id: {:?})", desired);
        self.substrate.open(desired.as_ref());
        self.state = SignalingState::Opening { desired };
        self.reconnect_spent = false;
    }

    /// Start surfacing inbound dials. Inbound links before this are closed and dropped.
    pub fn listen(&mut self) {
        self.listening = true;
    }

    pub fn dial(
        &mut self,
        target: &ParticipantId,
        local: &MediaStream,
    ) -> Result<Box<dyn MediaLink>, SignalingError> {
        self.require_ready()?;
        debug!("signaling: dialing media to {target}");
        Ok(self.substrate.dial(target, local))
    }

    pub fn open_data(&mut self, target: &ParticipantId) -> Result<Box<dyn DataLink>, SignalingError> {
        self.require_ready()?;
        debug!("signaling: opening data link to {target}");
        Ok(self.substrate.open_data(target))
    }

    /// Tear down the claimed id. Idempotent.
    pub fn destroy(&mut self) {
        if self.state == SignalingState::Destroyed {
            return;
        }
        if self.state != SignalingState::Idle {
            info!("signaling: destroying");
            self.substrate.destroy();
        }
        self.state = SignalingState::Destroyed;
        self.listening = false;
    }

    fn require_ready(&self) -> Result<(), SignalingError> {
        match self.state {
            SignalingState::Ready(_) => Ok(()),
            _ => Err(SignalingError::NotReady),
        }
    }

    /// Process one substrate event.
    pub fn handle(&mut self, event: SubstrateEvent) -> Option<SignalingEvent> {
        match event {
            SubstrateEvent::Opened(id) => self.on_opened(id),
            SubstrateEvent::IncomingMedia(mut link) => {
                if self.accepts_inbound() {
                    Some(SignalingEvent::IncomingMedia(link))
                } else {
                    debug!("signaling: refusing media from {} (not listening)", link.peer());
                    link.close();
                    None
                }
            }
            SubstrateEvent::IncomingData(mut link) => {
                if self.accepts_inbound() {
                    Some(SignalingEvent::IncomingData(link))
                } else {
                    debug!("signaling: refusing data from {} (not listening)", link.peer());
                    link.close();
                    None
                }
            }
            SubstrateEvent::Disconnected => self.on_disconnected(),
            SubstrateEvent::Error(e) => self.on_error(e),
        }
    }

    fn accepts_inbound(&self) -> bool {
        self.listening && matches!(self.state, SignalingState::Ready(_))
    }

    fn on_opened(&mut self, id: ParticipantId) -> Option<SignalingEvent> {
        match std::mem::replace(&mut self.state, SignalingState::Idle) {
            SignalingState::Opening { desired } => {
                if let Some(d) = desired.filter(|d| *d != id) {
                    warn!("signaling: asked for {d}, substrate opened {id}");
                }
                info!("signaling: ready as {id}");
                self.state = SignalingState::Ready(id.clone());
                Some(SignalingEvent::Ready(id))
            }
            SignalingState::Reconnecting(_) => {
                info!("signaling: reconnected as {id}");
                self.reconnect_spent = false;
                self.state = SignalingState::Ready(id.clone());
                Some(SignalingEvent::Reconnected(id))
            }
            other => {
                debug!("signaling: ignoring open for {id} in state {:?}", other);
                self.state = other;
                None
            }
        }
    }

    fn on_disconnected(&mut self) -> Option<SignalingEvent> {
        match std::mem::replace(&mut self.state, SignalingState::Idle) {
            SignalingState::Ready(id) if !self.reconnect_spent => {
                warn!("signaling: disconnected, retrying once as {id}");
                self.reconnect_spent = true;
                self.substrate.reconnect(&id);
                self.state = SignalingState::Reconnecting(id);
                Some(SignalingEvent::Reconnecting)
            }
            SignalingState::Ready(_)
            | SignalingState::Reconnecting(_)
            | SignalingState::Opening { .. } => {
                warn!("signaling: connection lost");
                self.state = SignalingState::Lost;
                Some(SignalingEvent::Failed(SignalingError::ConnectionLost))
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    fn on_error(&mut self, e: SubstrateError) -> Option<SignalingEvent> {
        match (self.state.clone(), e) {
            (SignalingState::Opening { desired }, SubstrateError::UnavailableId) => {
                let taken = desired.map(|d| d.to_string()).unwrap_or_default();
                warn!("signaling: id {taken} already claimed");
                self.state = SignalingState::Lost;
                Some(SignalingEvent::Failed(SignalingError::IdentifierTaken(taken)))
            }
            (SignalingState::Reconnecting(_), _) => {
                warn!("signaling: reconnect failed");
                self.state = SignalingState::Lost;
                Some(SignalingEvent::Failed(SignalingError::ConnectionLost))
            }
            (SignalingState::Destroyed, _) => None,
            (_, SubstrateError::PeerUnavailable(peer)) => Some(SignalingEvent::Failed(
                SignalingError::PeerUnreachable(peer.to_string()),
            )),
            (_, SubstrateError::UnavailableId) => Some(SignalingEvent::Failed(
                SignalingError::IdentifierTaken(String::new()),
            )),
            (_, SubstrateError::Other(msg)) => {
                Some(SignalingEvent::Failed(SignalingError::Substrate(msg)))
            }
        }
    }
}

impl fmt::Debug for SignalingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingClient")
            .field("state", &self.state)
            .field("listening", &self.listening)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera_stream, fake_data_link, fake_media_link, FakeSubstrate};

    fn ready_client(id: &str) -> (SignalingClient, FakeSubstrate) {
        let substrate = FakeSubstrate::default();
        let mut client = SignalingClient::new(Box::new(substrate.clone()));
        client.open(Some(ParticipantId::new(id)));
        client.listen();
        let ev = client.handle(SubstrateEvent::Opened(ParticipantId::new(id)));
        assert!(matches!(ev, Some(SignalingEvent::Ready(_))));
        (client, substrate)
    }

    #[test]
    fn host_claims_exact_id() {
        let substrate = FakeSubstrate::default();
        let mut client = SignalingClient::new(Box::new(substrate.clone()));
        client.open(Some(ParticipantId::new("ABCD-1234")));
        assert_eq!(
            substrate.log().opens,
            vec![Some(ParticipantId::new("ABCD-1234"))]
        );
        match client.handle(SubstrateEvent::Opened(ParticipantId::new("ABCD-1234"))) {
            Some(SignalingEvent::Ready(id)) => assert_eq!(id.as_str(), "ABCD-1234"),
            other => panic!("expected Ready, got {:?}", other),
        }
        assert_eq!(client.local_id().unwrap().as_str(), "ABCD-1234");
    }

    #[test]
    fn taken_id_surfaces_identifier_taken() {
        let substrate = FakeSubstrate::default();
        let mut client = SignalingClient::new(Box::new(substrate));
        client.open(Some(ParticipantId::new("room-1")));
        let ev = client.handle(SubstrateEvent::Error(SubstrateError::UnavailableId));
        match ev {
            Some(SignalingEvent::Failed(e)) => {
                assert_eq!(e, SignalingError::IdentifierTaken("room-1".into()));
                assert_eq!(e.status_text(), "ID Taken");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(*client.state(), SignalingState::Lost);
    }

    #[test]
    fn unreachable_peer_reports_room_not_found() {
        let (mut client, _) = ready_client("joiner-1");
        let ev = client.handle(SubstrateEvent::Error(SubstrateError::PeerUnavailable(
            ParticipantId::new("nope"),
        )));
        match ev {
            Some(SignalingEvent::Failed(e)) => assert_eq!(e.status_text(), "Room Not Found"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(matches!(client.state(), SignalingState::Ready(_)));
    }

    #[test]
    fn dial_requires_ready() {
        let substrate = FakeSubstrate::default();
        let mut client = SignalingClient::new(Box::new(substrate.clone()));
        let err = client
            .dial(&ParticipantId::new("host"), &camera_stream("cam"))
            .unwrap_err();
        assert_eq!(err, SignalingError::NotReady);
        assert!(substrate.log().dials.is_empty());
    }

    #[test]
    fn one_reconnect_then_connection_lost() {
        let (mut client, substrate) = ready_client("host-1");

        let ev = client.handle(SubstrateEvent::Disconnected);
        assert!(matches!(ev, Some(SignalingEvent::Reconnecting)));
        assert_eq!(substrate.log().reconnects, vec![ParticipantId::new("host-1")]);

        let ev = client.handle(SubstrateEvent::Disconnected);
        assert!(matches!(
            ev,
            Some(SignalingEvent::Failed(SignalingError::ConnectionLost))
        ));
        assert_eq!(substrate.log().reconnects.len(), 1);
        assert_eq!(*client.state(), SignalingState::Lost);
    }

    #[test]
    fn successful_reconnect_restores_budget() {
        let (mut client, substrate) = ready_client("host-1");
        client.handle(SubstrateEvent::Disconnected);
        let ev = client.handle(SubstrateEvent::Opened(ParticipantId::new("host-1")));
        assert!(matches!(ev, Some(SignalingEvent::Reconnected(_))));

        let ev = client.handle(SubstrateEvent::Disconnected);
        assert!(matches!(ev, Some(SignalingEvent::Reconnecting)));
        assert_eq!(substrate.log().reconnects.len(), 2);
    }

    #[test]
    fn inbound_links_dropped_until_listening() {
        let substrate = FakeSubstrate::default();
        let mut client = SignalingClient::new(Box::new(substrate));
        client.open(None);
        client.handle(SubstrateEvent::Opened(ParticipantId::new("x")));

        let (link, state) = fake_media_link("peer-a");
        assert!(client.handle(SubstrateEvent::IncomingMedia(link)).is_none());
        assert!(state.borrow().closed);

        client.listen();
        let (link, _) = fake_data_link("peer-a", false);
        assert!(matches!(
            client.handle(SubstrateEvent::IncomingData(link)),
            Some(SignalingEvent::IncomingData(_))
        ));
    }

    #[test]
    fn destroy_is_idempotent() {
        let (mut client, substrate) = ready_client("host-1");
        client.destroy();
        client.destroy();
        assert_eq!(substrate.log().destroyed, 1);
        assert!(client
            .handle(SubstrateEvent::Opened(ParticipantId::new("host-1")))
            .is_none());
    }
}
