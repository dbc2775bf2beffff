use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Error)]
pub enum TutorError {
    #[error("tutor is not configured")]
    NotConfigured,

    #[error("tutor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tutor returned status {0}")]
    Status(u16),
}

/// Text-completion collaborator: prompt in, free text out.
#[async_trait]
pub trait Tutor: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, TutorError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate; empty when there is none.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default()
    }
}

/// Gemini `generateContent` over HTTP
#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, TutorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key, model })
    }
}

#[async_trait]
impl Tutor for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, TutorError> {
        let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model);
        let body = GenerateRequest {
            contents: [Content { parts: [Part { text: prompt }] }],
        };

        debug!("Calling tutor model {} ({} prompt chars)", self.model, prompt.len());
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("Tutor model {} answered with status {}", self.model, status);
            return Err(TutorError::Status(status.as_u16()));
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.text())
    }
}

/// Stand-in used when no API key is configured.
pub struct UnconfiguredTutor;

#[async_trait]
impl Tutor for UnconfiguredTutor {
    async fn complete(&self, _prompt: &str) -> Result<String, TutorError> {
        Err(TutorError::NotConfigured)
    }
}
