//! Chapter narration. The narrator is an owned component: whoever shows a chapter
//! constructs one over a speech engine and drives it explicitly.

use std::fmt;

use log::debug;

/// Identifies one chunk handed to the engine.
pub type UtteranceId = u64;

/// Speaks one chunk at a time; reports `Narrator::on_utterance_end` when done.
pub trait SpeechEngine: fmt::Debug {
    fn speak(&mut self, id: UtteranceId, text: &str);
    fn pause(&mut self);
    fn resume(&mut self);
    fn cancel(&mut self);
}

/// Split into sentences ending in `.`, `!` or `?`; a trailing fragment without
/// terminal punctuation is its own chunk. Blank chunks are dropped.
pub fn sentence_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            while let Some(&p) = chars.peek() {
                if matches!(p, '.' | '!' | '?') {
                    current.push(p);
                    chars.next();
                } else {
                    break;
                }
            }
            push_trimmed(&mut chunks, &current);
            current.clear();
        }
    }
    push_trimmed(&mut chunks, &current);
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, s: &str) {
    let t = s.trim();
    if !t.is_empty() {
        chunks.push(t.to_string());
    }
}

type OnEnd = Box<dyn FnOnce()>;

pub struct Narrator {
    engine: Box<dyn SpeechEngine>,
    queue: Vec<String>,
    next_chunk: usize,
    current: Option<UtteranceId>,
    next_id: UtteranceId,
    on_end: Option<OnEnd>,
    paused: bool,
}

impl Narrator {
    pub fn new(engine: Box<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            queue: Vec::new(),
            next_chunk: 0,
            current: None,
            next_id: 1,
            on_end: None,
            paused: false,
        }
    }

    /// Start narrating `text`, superseding anything in progress. `on_end` runs once
    /// after the last chunk finishes, unless superseded first. Empty text ends at once.
    pub fn speak<F: FnOnce() + 'static>(&mut self, text: &str, on_end: F) {
        self.stop();
        self.queue = sentence_chunks(text);
        self.next_chunk = 0;
        self.on_end = Some(Box::new(on_end));
        debug!("narrator: {} chunks", self.queue.len());
        self.advance();
    }

    pub fn pause(&mut self) {
        if self.current.is_some() && !self.paused {
            self.paused = true;
            self.engine.pause();
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.engine.resume();
        }
    }

    /// Cancel narration. The pending `on_end` is dropped without being called.
    pub fn stop(&mut self) {
        if self.current.take().is_some() {
            self.engine.cancel();
        }
        self.queue.clear();
        self.next_chunk = 0;
        self.on_end = None;
        self.paused = false;
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some() && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The engine finished utterance `id`. Stale ids from superseded runs are ignored.
    pub fn on_utterance_end(&mut self, id: UtteranceId) {
        if self.current != Some(id) {
            return;
        }
        self.current = None;
        self.advance();
    }

    fn advance(&mut self) {
        match self.queue.get(self.next_chunk) {
            Some(chunk) => {
                let id = self.next_id;
                self.next_id += 1;
                self.next_chunk += 1;
                self.current = Some(id);
                self.engine.speak(id, chunk);
            }
            None => {
                self.queue.clear();
                self.next_chunk = 0;
                if let Some(done) = self.on_end.take() {
                    done();
                }
            }
        }
    }
}

impl fmt::Debug for Narrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Narrator")
            .field("chunks", &self.queue.len())
            .field("next_chunk", &self.next_chunk)
            .field("current", &self.current)
            .field("paused", &self.paused)
            .finish()
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        self.stop();
    }
}
