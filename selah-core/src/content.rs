//! Chapter content and the fetch contract.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub book_id: String,
    pub chapter_number: u32,
    /// Display reference from the content source, e.g. `John 3`.
    pub reference: String,
    pub verses: Vec<Verse>,
    /// Whole chapter as one text, used for narration.
    pub content: String,
}

pub const FALLBACK_REFERENCE: &str = "Error";
pub const FALLBACK_VERSE: &str = "Could not load content.";
pub const FALLBACK_CONTENT: &str = "Could not load content. Please check your connection.";

impl Chapter {
    /// Well-formed stand-in returned when a fetch fails for any reason.
    pub fn fallback(book_id: &str, chapter_number: u32) -> Self {
        Self {
            book_id: book_id.to_string(),
            chapter_number,
            reference: FALLBACK_REFERENCE.to_string(),
            verses: vec![Verse {
                number: 1,
                text: FALLBACK_VERSE.to_string(),
            }],
            content: FALLBACK_CONTENT.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.reference == FALLBACK_REFERENCE
    }

    pub fn verse(&self, number: u32) -> Option<&Verse> {
        self.verses.iter().find(|v| v.number == number)
    }
}

/// Fetches chapters. Never fails: on error the host delivers [`Chapter::fallback`].
/// The result comes back as `Event::ChapterLoaded` carrying the same `ticket`.
pub trait ContentClient: std::fmt::Debug {
    fn request_chapter(&mut self, ticket: u64, book_id: &str, chapter: u32);
}
