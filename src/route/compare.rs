//! External visual comparison of two route renderings.

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROMPT: &str = "You will receive two photos of the same climbing wall.
Image 1 is the query: the holds of a candidate climb are outlined with red boxes.
Image 2 is a reference route from my collection: its holds are outlined with blue boxes.
Boxes mark exactly one hold each but may be too large, too small or slightly misaligned,
so judge the physical holds rather than the outlines: hold colour, shape and texture,
position and spacing relative to other holds, orientation, and nearby wall features.

Do the red-outlined holds form the same route as the blue-outlined holds?
Start your answer with \"Yes\" or \"No\", then give a brief explanation after
\"Explanation:\" that cites the visual evidence.";

/// Verdict for one query/reference pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparatorReply {
    pub is_match: bool,
    /// Rationale given by the comparator, if any.
    pub explanation: Option<String>,
}

/// External oracle judging whether two renderings show the same route.
///
/// Replies are not reproducible between calls.
pub trait RouteComparator: Send + Sync + 'static {
    /// Compare the red `query` rendering with one stored blue `reference`.
    fn compare(
        &self,
        query: &[u8],
        reference: &[u8],
    ) -> impl Future<Output = Result<ComparatorReply>> + Send;
}

/// Multimodal `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiComparator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiComparator {
    pub fn new(model: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::UpstreamComparison(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            api_key,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
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
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

fn jpeg_part(bytes: &[u8]) -> Part<'static> {
    Part::Image {
        inline_data: InlineData {
            mime_type: "image/jpeg",
            data: STANDARD.encode(bytes),
        },
    }
}

impl RouteComparator for GeminiComparator {
    async fn compare(&self, query: &[u8], reference: &[u8]) -> Result<ComparatorReply> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::UpstreamComparison("GEMINI_API_KEY is not set".to_string()))?;

        let request = GenerateRequest {
            contents: [Content {
                parts: vec![Part::Text { text: PROMPT }, jpeg_part(query), jpeg_part(reference)],
            }],
        };
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamComparison(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::UpstreamComparison(format!(
                "comparator returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::UpstreamComparison(format!("malformed comparator response: {e}")))?;
        let text = parsed
            .text()
            .ok_or_else(|| PipelineError::UpstreamComparison("comparator returned no text".to_string()))?;

        let reply = parse_reply(&text);
        tracing::debug!(is_match = reply.is_match, response = %text, "comparator replied");
        Ok(reply)
    }
}

/// Interpret a free-text yes/no verdict.
pub fn parse_reply(text: &str) -> ComparatorReply {
    let lower = text.trim().to_lowercase();
    let is_match = leading_answer(&lower).unwrap_or_else(|| loose_answer(&lower));
    ComparatorReply {
        is_match,
        explanation: extract_explanation(text),
    }
}

/// A "yes"/"no" opening the reply, ignoring markdown and an `answer:` tag.
fn leading_answer(lower: &str) -> Option<bool> {
    let trimmed = lower.trim_start_matches(|c: char| c == '*' || c == '#' || c.is_whitespace());
    let trimmed = trimmed
        .strip_prefix("answer")
        .map(|rest| rest.trim_start_matches(|c: char| c == ':' || c == '*' || c.is_whitespace()))
        .unwrap_or(trimmed);
    let word: String = trimmed.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    match word.as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// "yes" appears and is not preceded by a "no" near the start.
fn loose_answer(lower: &str) -> bool {
    let Some(yes) = lower.find("yes") else {
        return false;
    };
    let head: String = lower.chars().take(50).collect();
    !head.contains("no") || lower.find("no").is_none_or(|no| yes < no)
}

fn extract_explanation(text: &str) -> Option<String> {
    let body = ["**Explanation:**", "**Explanation**", "Explanation:"]
        .iter()
        .find_map(|marker| text.split_once(marker).map(|(_, rest)| rest))
        .unwrap_or(text);

    let mut cleaned = body.replace("**", "").trim().to_string();
    for prefix in ["explanation:", "explanation", "answer:", "answer"] {
        let tagged = cleaned
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if tagged {
            cleaned = cleaned[prefix.len()..]
                .trim_start_matches(':')
                .trim()
                .to_string();
        }
    }
    (!cleaned.is_empty()).then_some(cleaned)
}
