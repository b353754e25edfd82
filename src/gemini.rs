//! Gemini client: turns stored history plus a new prompt into one reply,
//! speaking as the owner's secretary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::bot::message::StoredMessage;

const API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-preview-09-2025:generateContent";

/// Deadline after which the call is aborted and treated as a timeout.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum AiError {
    /// No API key configured.
    MissingKey,
    /// The endpoint could not be reached.
    Unreachable(String),
    /// Non-success HTTP status from the endpoint.
    Api { status: u16, body: String },
    /// Response body did not match the expected shape.
    Parse(String),
    /// Well-formed response with no candidate text.
    Empty,
    Timeout,
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => write!(f, "API key not configured"),
            Self::Unreachable(e) => write!(f, "endpoint unreachable: {e}"),
            Self::Api { status, body } => write!(f, "API error {status}: {body}"),
            Self::Parse(e) => write!(f, "unexpected response shape: {e}"),
            Self::Empty => write!(f, "empty response"),
            Self::Timeout => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for AiError {}

/// Turns conversation history plus a new prompt into one reply string.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, history: &[StoredMessage], prompt: &str) -> Result<String, AiError>;
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// The secretary persona, prepended to every conversation as a fixed
/// user/model exchange.
fn persona_preamble() -> String {
    let current_date = chrono::Utc::now().to_rfc3339();
    format!(
        "You are Mohamed’s personal secretary, and you reply on his behalf to everyone who \
messages him on WhatsApp. Your personality is simple and direct, speaking in respectful, calm, \
clear, and non-formal Egyptian Arabic.

**Your Primary Role & Duties:**
Your main duties are to handle communication professionally. This includes:
1.  Receiving messages and understanding requests.
2.  Replying professionally.
3.  Politely declining any requests unrelated to Mohamed's work.

**Current Date for Context: {current_date}**

**Communication Rules:**
-   **Tone:** Friendly Egyptian Arabic, short, organized sentences, no filler.
-   **Clarity:** If a message is unclear, ask only one direct clarifying question.
-   **Identity:** Do not say you are an AI. Use phrases like “I’m Mohamed’s secretary” or \
“I’ll inform Mohamed.”
-   **Language:** Do not use formal Arabic or English unless the user starts with them.
-   **Boundaries:** Never discuss general topics, politics, religion, or make unrealistic promises.

Your ultimate goal is to make all communication with Mohamed smooth, organized, and professional."
    )
}

/// Build the role-tagged content list: persona exchange, history, prompt.
fn build_contents(history: &[StoredMessage], prompt: &str) -> Vec<Content> {
    let mut contents = Vec::with_capacity(history.len() + 3);

    contents.push(Content {
        role: "user",
        parts: vec![Part {
            text: persona_preamble(),
        }],
    });
    contents.push(Content {
        role: "model",
        parts: vec![Part {
            text: "Okay, I will.".to_string(),
        }],
    });

    for msg in history {
        let role = if msg.is_from_bot() { "model" } else { "user" };
        contents.push(Content {
            role,
            parts: vec![Part {
                text: msg.text.clone(),
            }],
        });
    }

    contents.push(Content {
        role: "user",
        parts: vec![Part {
            text: prompt.to_string(),
        }],
    });

    contents
}

pub struct GeminiClient {
    api_key: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Responder for GeminiClient {
    async fn reply(&self, history: &[StoredMessage], prompt: &str) -> Result<String, AiError> {
        if self.api_key.is_empty() {
            return Err(AiError::MissingKey);
        }

        let request = GenerateRequest {
            contents: build_contents(history, prompt),
        };
        let url = format!("{API_URL}?key={}", self.api_key);

        let response = self
            .http
            .post(&url)
            .timeout(REQUEST_DEADLINE)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;

        parsed
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().find_map(|p| p.text))
            .ok_or(AiError::Empty)
    }
}

/// User-facing string for a responder failure. The reply still goes out as
/// a normal tracked send; the user sees an apology instead of silence.
pub fn error_reply(err: &AiError) -> String {
    match err {
        AiError::MissingKey => {
            "Error: GEMINI_API_KEY not set. Please set gemini_api_key in the config file."
                .to_string()
        }
        AiError::Api { status, .. } => {
            format!("Sorry, I encountered an error with the AI service: {status}")
        }
        AiError::Parse(_) | AiError::Empty => {
            "Sorry, I received an unexpected response from the AI.".to_string()
        }
        AiError::Timeout => "Sorry, the request to the AI service timed out.".to_string(),
        AiError::Unreachable(_) => {
            "Sorry, I was unable to connect to the AI service.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(sender: &str, text: &str) -> StoredMessage {
        StoredMessage {
            message_id: "m1".to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_contents_start_with_persona_exchange() {
        let contents = build_contents(&[], "hi");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, "user");
        assert!(contents[0].parts[0].text.contains("personal secretary"));
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[1].parts[0].text, "Okay, I will.");
        assert_eq!(contents[2].role, "user");
        assert_eq!(contents[2].parts[0].text, "hi");
    }

    #[test]
    fn test_history_role_mapping() {
        let history = vec![
            stored("20100000000@s.whatsapp.net", "question"),
            stored("bot", "answer"),
        ];
        let contents = build_contents(&history, "follow-up");

        assert_eq!(contents[2].role, "user");
        assert_eq!(contents[2].parts[0].text, "question");
        assert_eq!(contents[3].role, "model");
        assert_eq!(contents[3].parts[0].text, "answer");
        // The new prompt is always last, as a user turn.
        assert_eq!(contents.last().unwrap().role, "user");
        assert_eq!(contents.last().unwrap().parts[0].text, "follow-up");
    }

    #[test]
    fn test_error_replies() {
        assert!(error_reply(&AiError::Timeout).contains("timed out"));
        assert!(
            error_reply(&AiError::Api {
                status: 500,
                body: String::new()
            })
            .contains("500")
        );
        assert!(error_reply(&AiError::Empty).contains("unexpected response"));
        assert!(error_reply(&AiError::Unreachable("dns".to_string())).contains("unable to connect"));
        assert!(error_reply(&AiError::MissingKey).contains("GEMINI_API_KEY"));
    }
}
