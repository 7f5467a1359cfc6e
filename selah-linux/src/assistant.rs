//! HTTP client for a Gemini-style `generateContent` endpoint. Any failure yields
//! the request's apology text.

use std::fmt;
use std::time::Duration;

use log::debug;
use selah_core::{AssistantClient, Request, Speaker, Turn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

fn content<'a>(speaker: Speaker, text: &'a str) -> Content<'a> {
    let role = match speaker {
        Speaker::User => "user",
        Speaker::Assistant => "model",
    };
    Content {
        role,
        parts: [Part { text }],
    }
}

fn request_body(history: &[Turn], prompt: &str) -> serde_json::Result<Vec<u8>> {
    let mut contents: Vec<Content<'_>> = history.iter().map(|t| content(t.speaker, &t.text)).collect();
    contents.push(content(Speaker::User, prompt));
    serde_json::to_vec(&GenerateRequest { contents })
}

/// Text of the first candidate. Empty when the model returned nothing usable.
fn parse_reply(body: &[u8]) -> serde_json::Result<String> {
    let data: GenerateResponse = serde_json::from_slice(body)?;
    Ok(data
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default())
}

fn generate_url(base: &str, model: &str) -> String {
    format!("{base}/v1beta/models/{model}:generateContent")
}

async fn post(http: &reqwest::Client, url: &str, key: Option<&str>, body: Vec<u8>) -> anyhow::Result<String> {
    let key = key.ok_or_else(|| anyhow::anyhow!("no assistant API key configured"))?;
    let resp = http
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header("x-goog-api-key", key)
        .body(body)
        .send()
        .await?
        .error_for_status()?;
    let body = resp.bytes().await?;
    Ok(parse_reply(&body)?)
}

pub struct HttpAssistant {
    http: reqwest::Client,
    url: String,
    key: Option<String>,
    results: mpsc::UnboundedSender<(u64, String)>,
}

impl HttpAssistant {
    pub fn new(
        base_url: &str,
        model: &str,
        key: Option<String>,
        results: mpsc::UnboundedSender<(u64, String)>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            url: generate_url(base_url.trim_end_matches('/'), model),
            key,
            results,
        })
    }

    fn send(&self, ticket: u64, kind: Request, body: serde_json::Result<Vec<u8>>) {
        let http = self.http.clone();
        let url = self.url.clone();
        let key = self.key.clone();
        let results = self.results.clone();
        debug!("assistant: POST {url} ({kind:?}, ticket {ticket})");
        tokio::spawn(async move {
            let outcome = match body {
                Ok(body) => post(&http, &url, key.as_deref(), body).await,
                Err(e) => Err(e.into()),
            };
            let _ = results.send((ticket, kind.settle(outcome)));
        });
    }
}

impl AssistantClient for HttpAssistant {
    fn generate_notes(&mut self, ticket: u64, prompt: &str) {
        self.send(ticket, Request::Notes, request_body(&[], prompt));
    }

    fn chat(&mut self, ticket: u64, history: &[Turn], prompt: &str) {
        self.send(ticket, Request::Chat, request_body(history, prompt));
    }
}

impl fmt::Debug for HttpAssistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAssistant")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<set>"))
            .finish()
    }
}
