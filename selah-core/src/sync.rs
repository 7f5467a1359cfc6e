//! Shared reading state and chat transcript, kept in step across the mesh by
//! [`SyncMessage`]s. Navigation is last-write-wins: the most recent NAVIGATE applied
//! (local or remote) decides what is shown, including over in-flight fetches.

use std::fmt;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::call::Action;
use crate::catalog;
use crate::content::{Chapter, ContentClient};
use crate::ids::{ParticipantId, SYSTEM_SENDER};
use crate::protocol::SyncMessage;
use crate::registry::PeerRegistry;

/// Call view layout. Study shows the shared chapter beside a video strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Grid,
    Study,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    /// Network id for remote messages, `Host`/`Me` for our own, `System` for notices.
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Local>,
    pub system: bool,
}

impl ChatMessage {
    fn new(sender: &str, text: &str, system: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: Local::now(),
            system,
        }
    }
}

pub fn hand_notice(sender: &ParticipantId) -> String {
    format!("Peer {} raised their hand.", sender.short())
}

pub struct SyncEngine {
    content: Box<dyn ContentClient>,
    book_id: String,
    chapter: u32,
    active_verse: Option<u32>,
    layout: Layout,
    chapter_data: Option<Chapter>,
    /// Ticket of the latest fetch; older results are dropped.
    ticket: u64,
    in_flight: bool,
    transcript: Vec<ChatMessage>,
    hand_raised: bool,
}

impl SyncEngine {
    pub fn new(content: Box<dyn ContentClient>) -> Self {
        Self {
            content,
            book_id: catalog::DEFAULT_BOOK.to_string(),
            chapter: catalog::DEFAULT_CHAPTER,
            active_verse: None,
            layout: Layout::Grid,
            chapter_data: None,
            ticket: 0,
            in_flight: false,
            transcript: Vec::new(),
            hand_raised: false,
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    /// `John 3` style reference for the current position.
    pub fn reference(&self) -> String {
        catalog::reference(&self.book_id, self.chapter)
    }

    pub fn active_verse(&self) -> Option<u32> {
        self.active_verse
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Loaded chapter, only when it matches the current position.
    pub fn chapter_data(&self) -> Option<&Chapter> {
        self.chapter_data.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn hand_raised(&self) -> bool {
        self.hand_raised
    }

    /// Back to the default position with an empty transcript.
    pub fn reset(&mut self) {
        self.book_id = catalog::DEFAULT_BOOK.to_string();
        self.chapter = catalog::DEFAULT_CHAPTER;
        self.active_verse = None;
        self.layout = Layout::Grid;
        self.chapter_data = None;
        self.ticket += 1;
        self.in_flight = false;
        self.transcript.clear();
        self.hand_raised = false;
    }

    /// Switch layout. Entering Study loads the current chapter if it is not loaded.
    pub fn set_layout(&mut self, layout: Layout) -> Vec<Action> {
        if self.layout == layout {
            return Vec::new();
        }
        self.layout = layout;
        let mut actions = vec![Action::LayoutChanged(layout)];
        if layout == Layout::Study && self.chapter_data.is_none() && !self.in_flight {
            actions.extend(self.fetch_current());
        }
        actions
    }

    pub fn toggle_layout(&mut self) -> Vec<Action> {
        match self.layout {
            Layout::Grid => self.set_layout(Layout::Study),
            Layout::Study => self.set_layout(Layout::Grid),
        }
    }

    fn fetch_current(&mut self) -> Vec<Action> {
        self.ticket += 1;
        self.in_flight = true;
        debug!("sync: fetching {} {} (ticket {})", self.book_id, self.chapter, self.ticket);
        self.content.request_chapter(self.ticket, &self.book_id, self.chapter);
        vec![Action::ChapterRequested {
            book_id: self.book_id.clone(),
            chapter: self.chapter,
        }]
    }

    /// Move to `book_id`/`chapter` and enter Study. Returns false for positions
    /// outside the canon, leaving state untouched.
    fn move_to(&mut self, book_id: &str, chapter: u32, actions: &mut Vec<Action>) -> bool {
        if !catalog::is_valid(book_id, chapter) {
            warn!("sync: ignoring navigation to unknown position {book_id} {chapter}");
            return false;
        }
        let changed = self.book_id != book_id || self.chapter != chapter;
        if changed {
            self.book_id = book_id.to_string();
            self.chapter = chapter;
            self.chapter_data = None;
        }
        if self.layout != Layout::Study {
            self.layout = Layout::Study;
            actions.push(Action::LayoutChanged(Layout::Study));
        }
        if changed || (self.chapter_data.is_none() && !self.in_flight) {
            actions.extend(self.fetch_current());
        }
        true
    }

    /// Apply one message received from `from`.
    pub fn apply(&mut self, from: &ParticipantId, message: SyncMessage, peers: &mut PeerRegistry) -> Vec<Action> {
        debug!("sync: {} from {}", message.kind(), from);
        let mut actions = Vec::new();
        match message {
            SyncMessage::Navigate { book_id, chapter } => {
                self.move_to(&book_id, chapter, &mut actions);
            }
            SyncMessage::Highlight { verse_number } => {
                self.active_verse = Some(verse_number);
                actions.push(Action::ScrollToVerse(verse_number));
            }
            SyncMessage::Chat { text, sender_id } => {
                let msg = ChatMessage::new(&sender_id, &text, false);
                self.transcript.push(msg.clone());
                actions.push(Action::ChatAppended(msg));
            }
            SyncMessage::Hand { raised, sender_id } => {
                let sender = ParticipantId::new(sender_id);
                if !peers.set_hand(&sender, raised) {
                    debug!("sync: hand flag for unknown participant {sender}");
                }
                actions.push(Action::HandChanged {
                    peer: sender.clone(),
                    raised,
                });
                if raised {
                    let notice = ChatMessage::new(SYSTEM_SENDER, &hand_notice(&sender), true);
                    self.transcript.push(notice.clone());
                    actions.push(Action::ChatAppended(notice));
                }
            }
        }
        actions
    }

    /// Local navigation: move, clear the highlighted verse and broadcast.
    pub fn navigate(&mut self, book_id: &str, chapter: u32, peers: &mut PeerRegistry) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.move_to(book_id, chapter, &mut actions) {
            return actions;
        }
        self.active_verse = None;
        info!("sync: navigating to {}", self.reference());
        peers.broadcast_data(&SyncMessage::Navigate {
            book_id: self.book_id.clone(),
            chapter: self.chapter,
        });
        actions
    }

    pub fn next_chapter(&mut self, peers: &mut PeerRegistry) -> Vec<Action> {
        match catalog::next_chapter(&self.book_id, self.chapter) {
            Some((book, chapter)) => self.navigate(book, chapter, peers),
            None => Vec::new(),
        }
    }

    pub fn prev_chapter(&mut self, peers: &mut PeerRegistry) -> Vec<Action> {
        match catalog::prev_chapter(&self.book_id, self.chapter) {
            Some((book, chapter)) => self.navigate(book, chapter, peers),
            None => Vec::new(),
        }
    }

    pub fn tap_verse(&mut self, verse_number: u32, peers: &mut PeerRegistry) -> Vec<Action> {
        self.active_verse = Some(verse_number);
        peers.broadcast_data(&SyncMessage::Highlight { verse_number });
        vec![Action::ScrollToVerse(verse_number)]
    }

    /// Append our own message at once under `label`, then broadcast it under `sender_id`.
    pub fn send_chat(
        &mut self,
        text: &str,
        label: &str,
        sender_id: &str,
        peers: &mut PeerRegistry,
    ) -> Vec<Action> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let msg = ChatMessage::new(label, text, false);
        self.transcript.push(msg.clone());
        peers.broadcast_data(&SyncMessage::Chat {
            text: text.to_string(),
            sender_id: sender_id.to_string(),
        });
        vec![Action::ChatAppended(msg)]
    }

    pub fn toggle_hand(&mut self, sender_id: &str, peers: &mut PeerRegistry) -> Vec<Action> {
        self.hand_raised = !self.hand_raised;
        peers.broadcast_data(&SyncMessage::Hand {
            raised: self.hand_raised,
            sender_id: sender_id.to_string(),
        });
        vec![Action::LocalHandChanged(self.hand_raised)]
    }

    /// A peer's data link just opened. The host catches it up on the reading position.
    pub fn on_peer_data_open(&mut self, peer: &ParticipantId, is_host: bool, peers: &mut PeerRegistry) {
        if !is_host {
            return;
        }
        let msg = SyncMessage::Navigate {
            book_id: self.book_id.clone(),
            chapter: self.chapter,
        };
        if peers.send_to(peer, &msg) {
            debug!("sync: sent reading position to {peer}");
        }
    }

    /// Content for `ticket` arrived. Stale tickets are dropped.
    pub fn on_chapter_loaded(&mut self, ticket: u64, chapter: Chapter) -> Vec<Action> {
        if ticket != self.ticket || !self.in_flight {
            debug!("sync: dropping stale chapter (ticket {ticket}, latest {})", self.ticket);
            return Vec::new();
        }
        self.in_flight = false;
        if chapter.is_fallback() {
            warn!("sync: content unavailable for {} {}", self.book_id, self.chapter);
        }
        self.chapter_data = Some(chapter.clone());
        vec![Action::ChapterShown(chapter)]
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("book_id", &self.book_id)
            .field("chapter", &self.chapter)
            .field("active_verse", &self.active_verse)
            .field("layout", &self.layout)
            .field("ticket", &self.ticket)
            .field("transcript", &self.transcript.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Links;
    use crate::testing::{fake_data_link, sample_chapter, FakeContent};

    fn engine() -> (SyncEngine, FakeContent) {
        let content = FakeContent::default();
        (SyncEngine::new(Box::new(content.clone())), content)
    }

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn nav(book: &str, chapter: u32) -> SyncMessage {
        SyncMessage::Navigate {
            book_id: book.into(),
            chapter,
        }
    }

    #[test]
    fn navigate_switches_to_study_and_fetches() {
        let (mut e, content) = engine();
        let mut peers = PeerRegistry::new();
        let actions = e.apply(&pid("host"), nav("john", 3), &mut peers);
        assert_eq!(e.layout(), Layout::Study);
        assert_eq!((e.book_id(), e.chapter()), ("john", 3));
        assert!(actions.contains(&Action::LayoutChanged(Layout::Study)));
        assert_eq!(content.log().requests, vec![(1, "john".to_string(), 3)]);

        let shown = e.on_chapter_loaded(1, sample_chapter("john", 3));
        assert!(matches!(&shown[..], [Action::ChapterShown(c)] if c.reference == "John 3"));
        assert_eq!(e.chapter_data().unwrap().reference, "John 3");
    }

    #[test]
    fn last_navigate_wins_over_inflight_fetches() {
        let (mut e, content) = engine();
        let mut peers = PeerRegistry::new();
        e.apply(&pid("h"), nav("john", 3), &mut peers);
        e.apply(&pid("h"), nav("romans", 8), &mut peers);
        e.apply(&pid("h"), nav("ruth", 2), &mut peers);
        assert_eq!(content.log().requests.len(), 3);

        assert!(e.on_chapter_loaded(3, sample_chapter("ruth", 2)).len() == 1);
        assert!(e.on_chapter_loaded(1, sample_chapter("john", 3)).is_empty());
        assert!(e.on_chapter_loaded(2, sample_chapter("romans", 8)).is_empty());
        assert_eq!(e.chapter_data().unwrap().book_id, "ruth");
        assert_eq!(e.reference(), "Ruth 2");
    }

    #[test]
    fn repeated_navigate_and_highlight_are_idempotent() {
        let (mut e, content) = engine();
        let mut peers = PeerRegistry::new();
        e.apply(&pid("h"), nav("john", 3), &mut peers);
        let again = e.apply(&pid("h"), nav("john", 3), &mut peers);
        assert!(again.is_empty());
        assert_eq!(content.log().requests.len(), 1);

        let hl = SyncMessage::Highlight { verse_number: 16 };
        e.apply(&pid("h"), hl.clone(), &mut peers);
        e.apply(&pid("h"), hl, &mut peers);
        assert_eq!(e.active_verse(), Some(16));
        assert_eq!((e.book_id(), e.chapter()), ("john", 3));
    }

    #[test]
    fn unknown_position_ignored() {
        let (mut e, content) = engine();
        let mut peers = PeerRegistry::new();
        assert!(e.apply(&pid("h"), nav("hezekiah", 1), &mut peers).is_empty());
        assert!(e.apply(&pid("h"), nav("john", 99), &mut peers).is_empty());
        assert_eq!((e.book_id(), e.chapter()), ("john", 1));
        assert_eq!(e.layout(), Layout::Grid);
        assert!(content.log().requests.is_empty());
    }

    #[test]
    fn chat_appended_once_per_receipt() {
        let (mut e, _) = engine();
        let mut peers = PeerRegistry::new();
        let msg = SyncMessage::Chat {
            text: "Hello".into(),
            sender_id: "peer-1".into(),
        };
        e.apply(&pid("peer-1"), msg.clone(), &mut peers);
        e.apply(&pid("peer-1"), msg, &mut peers);
        assert_eq!(e.transcript().len(), 2);
        assert_eq!(e.transcript()[0].sender, "peer-1");
        assert!(!e.transcript()[0].system);
    }

    #[test]
    fn hand_raise_tracks_latest_and_posts_notice() {
        let (mut e, _) = engine();
        let mut peers = PeerRegistry::new();
        let (data, _) = fake_data_link("peer-abcd1234", true);
        peers.add_or_update(pid("peer-abcd1234"), Links::data(data));

        for raised in [true, false, true, false] {
            e.apply(
                &pid("peer-abcd1234"),
                SyncMessage::Hand {
                    raised,
                    sender_id: "peer-abcd1234".into(),
                },
                &mut peers,
            );
            assert_eq!(peers.hand_raised(&pid("peer-abcd1234")), Some(raised));
        }
        let notices: Vec<_> = e.transcript().iter().filter(|m| m.system).collect();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].text, "Peer 1234 raised their hand.");
        assert_eq!(notices[0].sender, "System");
    }

    #[test]
    fn local_next_clears_verse_and_broadcasts() {
        let (mut e, _) = engine();
        let mut peers = PeerRegistry::new();
        let (data, state) = fake_data_link("a", true);
        peers.add_or_update(pid("a"), Links::data(data));
        e.navigate("john", 21, &mut peers);
        e.tap_verse(25, &mut peers);
        e.next_chapter(&mut peers);

        assert_eq!((e.book_id(), e.chapter()), ("acts", 1));
        assert_eq!(e.active_verse(), None);
        let sent = state.borrow().sent_messages();
        assert_eq!(
            sent,
            vec![
                nav("john", 21),
                SyncMessage::Highlight { verse_number: 25 },
                nav("acts", 1),
            ]
        );
    }

    #[test]
    fn send_chat_appends_label_and_broadcasts_network_id() {
        let (mut e, _) = engine();
        let mut peers = PeerRegistry::new();
        let (data, state) = fake_data_link("a", true);
        peers.add_or_update(pid("a"), Links::data(data));

        assert!(e.send_chat("   ", "Host", "ABCD-1234", &mut peers).is_empty());
        e.send_chat("Hello", "Host", "ABCD-1234", &mut peers);
        assert_eq!(e.transcript().len(), 1);
        assert_eq!(e.transcript()[0].sender, "Host");
        assert_eq!(
            state.borrow().sent_messages(),
            vec![SyncMessage::Chat {
                text: "Hello".into(),
                sender_id: "ABCD-1234".into()
            }]
        );
    }

    #[test]
    fn host_catches_up_new_peer_only() {
        let (mut e, _) = engine();
        let mut peers = PeerRegistry::new();
        let (old, old_state) = fake_data_link("old", true);
        let (new, new_state) = fake_data_link("new", true);
        peers.add_or_update(pid("old"), Links::data(old));
        peers.add_or_update(pid("new"), Links::data(new));
        e.navigate("john", 3, &mut peers);

        e.on_peer_data_open(&pid("new"), true, &mut peers);
        assert_eq!(old_state.borrow().sent.len(), 1);
        assert_eq!(new_state.borrow().sent_messages().last(), Some(&nav("john", 3)));

        e.on_peer_data_open(&pid("old"), false, &mut peers);
        assert_eq!(old_state.borrow().sent.len(), 1);
    }

    #[test]
    fn entering_study_loads_once() {
        let (mut e, content) = engine();
        e.set_layout(Layout::Study);
        e.toggle_layout();
        e.toggle_layout();
        assert_eq!(content.log().requests.len(), 1);
    }
}
