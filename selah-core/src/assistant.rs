//! Study assistant: generated notes on a verse and a study-coach chat about it.
//!
//! The model lives behind [`AssistantClient`]. A client never reports an error to the
//! caller: whatever goes wrong, the host delivers the request's apology text instead
//! (see [`Request::settle`]). Replies come back through [`StudyCoach::on_reply`] with
//! the ticket the request was issued under.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::Chapter;

pub const NOTES_APOLOGY: &str = "Unable to load study notes at this time.";
pub const CHAT_APOLOGY: &str = "Sorry, I couldn't process that request.";
pub const NOTES_EMPTY: &str = "No insights found.";
pub const CHAT_EMPTY: &str = "I'm thinking...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Notes,
    Chat,
}

impl Request {
    pub fn apology(self) -> &'static str {
        match self {
            Request::Notes => NOTES_APOLOGY,
            Request::Chat => CHAT_APOLOGY,
        }
    }

    fn empty(self) -> &'static str {
        match self {
            Request::Notes => NOTES_EMPTY,
            Request::Chat => CHAT_EMPTY,
        }
    }

    /// Text to show for a finished request. Failures become the apology, blank
    /// replies the placeholder.
    pub fn settle<E: fmt::Display>(self, outcome: Result<String, E>) -> String {
        match outcome {
            Ok(text) if text.trim().is_empty() => self.empty().to_string(),
            Ok(text) => text,
            Err(e) => {
                log::warn!("assistant: {self:?} failed: {e}");
                self.apology().to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

/// The verse a conversation is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub book_name: String,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
}

impl Passage {
    /// `None` when the chapter has no such verse or is the fallback stand-in.
    pub fn select(chapter: &Chapter, book_name: &str, verse: u32) -> Option<Self> {
        if chapter.is_fallback() {
            return None;
        }
        chapter.verse(verse).map(|v| Self {
            book_name: book_name.to_string(),
            chapter: chapter.chapter_number,
            verse: v.number,
            text: v.text.clone(),
        })
    }

    /// `Romans 8:28`
    pub fn citation(&self) -> String {
        format!("{} {}:{}", self.book_name, self.chapter, self.verse)
    }

    fn context(&self) -> String {
        format!("{} - \"{}\"", self.citation(), self.text)
    }

    fn greeting(&self) -> String {
        format!(
            "Hi! I'm your study assistant. I can help you understand {}. What's on your mind?",
            self.citation()
        )
    }
}

pub fn notes_prompt(p: &Passage) -> String {
    format!(
        "You are a deeply knowledgeable biblical scholar and historian.\n\
         Provide a concise, culturally rich, and theological explanation for the following passage from {} Chapter {}:\n\
         \"{}\"\n\n\
         Include:\n\
         1. Historical context (Who, When, Where).\n\
         2. Key Greek/Hebrew word insights if applicable.\n\
         3. Theological significance.\n\n\
         Keep it under 200 words. Format with clear headings in Markdown.",
        p.book_name, p.chapter, p.text
    )
}

pub fn coach_prompt(p: &Passage, question: &str) -> String {
    format!(
        "Context: User is reading {}.\n\
         User Question: {}\n\n\
         Answer as a helpful, neutral study coach. Cite sources if possible. Keep it conversational but academic.",
        p.context(),
        question
    )
}

/// Talks to a generative model. Results go back to the host as `(ticket, text)`,
/// already settled: a failed call yields [`Request::apology`], never an error.
pub trait AssistantClient: fmt::Debug {
    fn generate_notes(&mut self, ticket: u64, prompt: &str);
    /// `history` is the conversation so far, oldest first, not including `prompt`.
    fn chat(&mut self, ticket: u64, history: &[Turn], prompt: &str);
}

/// One participant's assistant drawer: notes plus a chat, both about one verse.
#[derive(Debug)]
pub struct StudyCoach {
    client: Box<dyn AssistantClient>,
    passage: Option<Passage>,
    notes: Option<String>,
    history: Vec<Turn>,
    ticket: u64,
    waiting: Option<(u64, Request)>,
}

impl StudyCoach {
    pub fn new(client: Box<dyn AssistantClient>) -> Self {
        Self {
            client,
            passage: None,
            notes: None,
            history: Vec::new(),
            ticket: 0,
            waiting: None,
        }
    }

    pub fn passage(&self) -> Option<&Passage> {
        self.passage.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.is_some()
    }

    fn issue(&mut self, kind: Request) -> u64 {
        self.ticket += 1;
        self.waiting = Some((self.ticket, kind));
        self.ticket
    }

    /// Focus on a verse: drops the old notes and chat, greets, and asks for notes.
    /// Returns the greeting.
    pub fn open(&mut self, passage: Passage) -> &str {
        let ticket = self.issue(Request::Notes);
        self.client.generate_notes(ticket, &notes_prompt(&passage));
        self.notes = None;
        self.history = vec![Turn {
            speaker: Speaker::Assistant,
            text: passage.greeting(),
        }];
        self.passage = Some(passage);
        &self.history[0].text
    }

    /// Send a question about the open verse. Blank input, no open verse, or a
    /// request still in flight are ignored and return `false`.
    pub fn ask(&mut self, question: &str) -> bool {
        let question = question.trim();
        if question.is_empty() || self.waiting.is_some() {
            return false;
        }
        let prompt = match &self.passage {
            Some(p) => coach_prompt(p, question),
            None => return false,
        };
        let ticket = self.issue(Request::Chat);
        self.client.chat(ticket, &self.history, &prompt);
        self.history.push(Turn {
            speaker: Speaker::User,
            text: question.to_string(),
        });
        true
    }

    /// Accept a settled reply. Stale tickets are dropped.
    pub fn on_reply(&mut self, ticket: u64, text: String) -> Option<(Request, &str)> {
        match self.waiting {
            Some((current, kind)) if current == ticket => {
                self.waiting = None;
                let slot = match kind {
                    Request::Notes => self.notes.insert(text),
                    Request::Chat => {
                        self.history.push(Turn {
                            speaker: Speaker::Assistant,
                            text,
                        });
                        &mut self.history.last_mut()?.text
                    }
                };
                Some((kind, slot.as_str()))
            }
            _ => {
                log::debug!("assistant: dropping reply for ticket {ticket}");
                None
            }
        }
    }
}
