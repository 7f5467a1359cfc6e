//! Console speech engine: prints each chunk and paces it like spoken text.

use std::time::Duration;

use log::debug;
use selah_core::narration::{SpeechEngine, UtteranceId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PER_WORD: Duration = Duration::from_millis(350);

fn pace(text: &str) -> Duration {
    PER_WORD * text.split_whitespace().count().max(1) as u32
}

#[derive(Debug)]
pub struct ConsoleSpeech {
    done: mpsc::UnboundedSender<UtteranceId>,
    current: Option<(UtteranceId, Duration)>,
    timer: Option<JoinHandle<()>>,
}

impl ConsoleSpeech {
    pub fn new(done: mpsc::UnboundedSender<UtteranceId>) -> Self {
        Self {
            done,
            current: None,
            timer: None,
        }
    }

    fn arm(&mut self, id: UtteranceId, after: Duration) {
        let done = self.done.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = done.send(id);
        }));
    }

    fn disarm(&mut self) {
        if let Some(t) = self.timer.take() {
            t.abort();
        }
    }
}

impl SpeechEngine for ConsoleSpeech {
    fn speak(&mut self, id: UtteranceId, text: &str) {
        self.disarm();
        println!("[read] {text}");
        let after = pace(text);
        self.current = Some((id, after));
        self.arm(id, after);
    }

    fn pause(&mut self) {
        debug!("speech: pause");
        self.disarm();
    }

    // restarts the current chunk's timer from the top
    fn resume(&mut self) {
        if let Some((id, after)) = self.current {
            self.arm(id, after);
        }
    }

    fn cancel(&mut self) {
        self.disarm();
        self.current = None;
    }
}

impl Drop for ConsoleSpeech {
    fn drop(&mut self) {
        self.disarm();
    }
}
