//! HTTP chapter client. Any failure yields the fallback chapter.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use selah_core::{Chapter, ContentClient, Verse};
use serde::Deserialize;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    reference: String,
    verses: Vec<ApiVerse>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiVerse {
    verse: u32,
    text: String,
}

/// Map a content API body onto a chapter.
fn parse_chapter(book_id: &str, chapter: u32, body: &[u8]) -> Result<Chapter, serde_json::Error> {
    let data: ApiResponse = serde_json::from_slice(body)?;
    Ok(Chapter {
        book_id: book_id.to_string(),
        chapter_number: chapter,
        reference: data.reference,
        verses: data
            .verses
            .into_iter()
            .map(|v| Verse {
                number: v.verse,
                text: v.text.trim().to_string(),
            })
            .collect(),
        content: data.text,
    })
}

fn chapter_url(base: &str, translation: &str, book_id: &str, chapter: u32) -> String {
    format!("{base}/{book_id}+{chapter}?translation={translation}")
}

async fn fetch(http: &reqwest::Client, url: &str, book_id: &str, chapter: u32) -> anyhow::Result<Chapter> {
    let resp = http.get(url).send().await?.error_for_status()?;
    let body = resp.bytes().await?;
    Ok(parse_chapter(book_id, chapter, &body)?)
}

pub struct HttpContent {
    http: reqwest::Client,
    base_url: String,
    translation: String,
    results: mpsc::UnboundedSender<(u64, Chapter)>,
}

impl HttpContent {
    pub fn new(
        base_url: &str,
        translation: &str,
        results: mpsc::UnboundedSender<(u64, Chapter)>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            translation: translation.to_string(),
            results,
        })
    }
}

impl ContentClient for HttpContent {
    fn request_chapter(&mut self, ticket: u64, book_id: &str, chapter: u32) {
        let url = chapter_url(&self.base_url, &self.translation, book_id, chapter);
        let http = self.http.clone();
        let results = self.results.clone();
        let book_id = book_id.to_string();
        debug!("content: GET {url} (ticket {ticket})");
        tokio::spawn(async move {
            let loaded = match fetch(&http, &url, &book_id, chapter).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("content: {book_id} {chapter} failed: {e}");
                    Chapter::fallback(&book_id, chapter)
                }
            };
            let _ = results.send((ticket, loaded));
        });
    }
}

impl fmt::Debug for HttpContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpContent")
            .field("base_url", &self.base_url)
            .field("translation", &self.translation)
            .finish()
    }
}
