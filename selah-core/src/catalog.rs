//! The 66-book canon and chapter arithmetic over it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Testament {
    Old,
    New,
}

/// A book of the canon. `id` is the content API's identifier for the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Book {
    pub id: &'static str,
    pub name: &'static str,
    pub testament: Testament,
    pub chapter_count: u32,
}

const fn book(id: &'static str, name: &'static str, testament: Testament, chapter_count: u32) -> Book {
    Book {
        id,
        name,
        testament,
        chapter_count,
    }
}

pub static BOOKS: [Book; 66] = [
    book("genesis", "Genesis", Testament::Old, 50),
    book("exodus", "Exodus", Testament::Old, 40),
    book("leviticus", "Leviticus", Testament::Old, 27),
    book("numbers", "Numbers", Testament::Old, 36),
    book("deuteronomy", "Deuteronomy", Testament::Old, 34),
    book("joshua", "Joshua", Testament::Old, 24),
    book("judges", "Judges", Testament::Old, 21),
    book("ruth", "Ruth", Testament::Old, 4),
    book("1samuel", "1 Samuel", Testament::Old, 31),
    book("2samuel", "2 Samuel", Testament::Old, 24),
    book("1kings", "1 Kings", Testament::Old, 22),
    book("2kings", "2 Kings", Testament::Old, 25),
    book("1chronicles", "1 Chronicles", Testament::Old, 29),
    book("2chronicles", "2 Chronicles", Testament::Old, 36),
    book("ezra", "Ezra", Testament::Old, 10),
    book("nehemiah", "Nehemiah", Testament::Old, 13),
    book("esther", "Esther", Testament::Old, 10),
    book("job", "Job", Testament::Old, 42),
    book("psalms", "Psalms", Testament::Old, 150),
    book("proverbs", "Proverbs", Testament::Old, 31),
    book("ecclesiastes", "Ecclesiastes", Testament::Old, 12),
    book("songofsolomon", "Song of Solomon", Testament::Old, 8),
    book("isaiah", "Isaiah", Testament::Old, 66),
    book("jeremiah", "Jeremiah", Testament::Old, 52),
    book("lamentations", "Lamentations", Testament::Old, 5),
    book("ezekiel", "Ezekiel", Testament::Old, 48),
    book("daniel", "Daniel", Testament::Old, 12),
    book("hosea", "Hosea", Testament::Old, 14),
    book("joel", "Joel", Testament::Old, 3),
    book("amos", "Amos", Testament::Old, 9),
    book("obadiah", "Obadiah", Testament::Old, 1),
    book("jonah", "Jonah", Testament::Old, 4),
    book("micah", "Micah", Testament::Old, 7),
    book("nahum", "Nahum", Testament::Old, 3),
    book("habakkuk", "Habakkuk", Testament::Old, 3),
    book("zephaniah", "Zephaniah", Testament::Old, 3),
    book("haggai", "Haggai", Testament::Old, 2),
    book("zechariah", "Zechariah", Testament::Old, 14),
    book("malachi", "Malachi", Testament::Old, 4),
    book("matthew", "Matthew", Testament::New, 28),
    book("mark", "Mark", Testament::New, 16),
    book("luke", "Luke", Testament::New, 24),
    book("john", "John", Testament::New, 21),
    book("acts", "Acts", Testament::New, 28),
    book("romans", "Romans", Testament::New, 16),
    book("1corinthians", "1 Corinthians", Testament::New, 16),
    book("2corinthians", "2 Corinthians", Testament::New, 13),
    book("galatians", "Galatians", Testament::New, 6),
    book("ephesians", "Ephesians", Testament::New, 6),
    book("philippians", "Philippians", Testament::New, 4),
    book("colossians", "Colossians", Testament::New, 4),
    book("1thessalonians", "1 Thessalonians", Testament::New, 5),
    book("2thessalonians", "2 Thessalonians", Testament::New, 3),
    book("1timothy", "1 Timothy", Testament::New, 6),
    book("2timothy", "2 Timothy", Testament::New, 4),
    book("titus", "Titus", Testament::New, 3),
    book("philemon", "Philemon", Testament::New, 1),
    book("hebrews", "Hebrews", Testament::New, 13),
    book("james", "James", Testament::New, 5),
    book("1peter", "1 Peter", Testament::New, 5),
    book("2peter", "2 Peter", Testament::New, 3),
    book("1john", "1 John", Testament::New, 5),
    book("2john", "2 John", Testament::New, 1),
    book("3john", "3 John", Testament::New, 1),
    book("jude", "Jude", Testament::New, 1),
    book("revelation", "Revelation", Testament::New, 22),
];

pub const DEFAULT_BOOK: &str = "john";
pub const DEFAULT_CHAPTER: u32 = 1;

pub fn books() -> &'static [Book] {
    &BOOKS
}

pub fn find(book_id: &str) -> Option<&'static Book> {
    BOOKS.iter().find(|b| b.id == book_id)
}

fn index_of(book_id: &str) -> Option<usize> {
    BOOKS.iter().position(|b| b.id == book_id)
}

/// True if `chapter` exists in `book_id`.
pub fn is_valid(book_id: &str, chapter: u32) -> bool {
    find(book_id)
        .map(|b| chapter >= 1 && chapter <= b.chapter_count)
        .unwrap_or(false)
}

/// Display reference like `John 3`. Falls back to the raw id for unknown books.
pub fn reference(book_id: &str, chapter: u32) -> String {
    match find(book_id) {
        Some(b) => format!("{} {}", b.name, chapter),
        None => format!("{} {}", book_id, chapter),
    }
}

/// Chapter after the given one, continuing into the next book and wrapping from
/// Revelation back to Genesis. `None` for an unknown book.
pub fn next_chapter(book_id: &str, chapter: u32) -> Option<(&'static str, u32)> {
    let idx = index_of(book_id)?;
    let b = &BOOKS[idx];
    if chapter < b.chapter_count {
        return Some((b.id, chapter + 1));
    }
    let next = &BOOKS[(idx + 1) % BOOKS.len()];
    Some((next.id, 1))
}

/// Chapter before the given one, stepping into the previous book's last chapter
/// and wrapping from Genesis 1 to Revelation 22.
pub fn prev_chapter(book_id: &str, chapter: u32) -> Option<(&'static str, u32)> {
    let idx = index_of(book_id)?;
    let b = &BOOKS[idx];
    if chapter > 1 {
        return Some((b.id, (chapter - 1).min(b.chapter_count)));
    }
    let prev = &BOOKS[(idx + BOOKS.len() - 1) % BOOKS.len()];
    Some((prev.id, prev.chapter_count))
}
