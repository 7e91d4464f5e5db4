//! Question answering over uploaded documents (`/rag`).
//!
//! [`RagService`] is the plain request/response contract. [`Conversation`]
//! adds what a chat view needs on top: a stable conversation id sent with
//! every question, the ordered list of exchanges, and a [`RequestGuard`] so an
//! answer that arrives after a newer question was asked is dropped.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::guard::RequestGuard;
use crate::http::ApiClient;

/// Question label used for voice questions, whose text only the backend sees.
pub const VOICE_QUESTION_LABEL: &str = "[Voice Question]";

/// Default page size for the question history.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub file_id: i64,
    pub filename: String,
    #[serde(default)]
    pub page_number: Option<i64>,
    pub chunk_index: i64,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    pub image_path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub page_number: Option<i64>,
    pub file_id: i64,
}

/// The backend's answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceReference>,
    #[serde(default)]
    pub images: Vec<ImageReference>,
    pub confidence_score: f64,
    pub question_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: i64,
    pub question_text: String,
    pub user_id: i64,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context_files: Option<String>,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResponse {
    pub id: i64,
    pub answer_text: String,
    pub question_id: i64,
    pub confidence_score: f64,
    #[serde(default)]
    pub sources_used: Option<String>,
    #[serde(default)]
    pub images_used: Option<String>,
    #[serde(default)]
    pub processing_time_ms: Option<String>,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A stored question together with its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: QuestionResponse,
    pub answer: QaResponse,
    #[serde(default)]
    pub images: Vec<ImageReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub total_questions: u64,
    pub total_answers: u64,
    pub avg_confidence: f64,
}

#[derive(Serialize)]
struct QuestionRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// RagService
// ---------------------------------------------------------------------------

/// Client for the `/rag` endpoints.
#[derive(Clone)]
pub struct RagService {
    api: Arc<ApiClient>,
}

impl RagService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn ask(&self, question: &str, session_id: Option<&str>) -> Result<AnswerResponse> {
        debug!(session_id = session_id, "asking question");
        self.api
            .send_json(
                Method::POST,
                "/rag/ask",
                &QuestionRequest {
                    question,
                    session_id,
                },
                "Failed to ask question",
            )
            .await
    }

    /// Ask a recorded question; the backend transcribes the audio first.
    pub async fn ask_voice(&self, audio: &Path, session_id: Option<&str>) -> Result<AnswerResponse> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "voice-question.webm".to_string());

        let mut form = Form::new().part("audio_file", Part::bytes(bytes).file_name(file_name));
        if let Some(session_id) = session_id {
            form = form.text("session_id", session_id.to_string());
        }

        self.api
            .post_multipart("/rag/ask-voice", form, "Failed to process voice question")
            .await
    }

    pub async fn history(&self, limit: u32) -> Result<Vec<QaPair>> {
        self.api
            .get_json(&format!("/rag/history?limit={limit}"), "Failed to fetch history")
            .await
    }

    pub async fn session_history(&self, session_id: &str) -> Result<Vec<QaPair>> {
        let encoded: String = url::form_urlencoded::byte_serialize(session_id.as_bytes()).collect();
        self.api
            .get_json(
                &format!("/rag/session/{encoded}"),
                "Failed to fetch session history",
            )
            .await
    }

    pub async fn delete_question(&self, question_id: i64) -> Result<()> {
        self.api
            .delete(
                &format!("/rag/question/{question_id}"),
                "Failed to delete question",
            )
            .await
    }

    pub async fn stats(&self) -> Result<QuestionStats> {
        self.api.get_json("/rag/stats", "Failed to fetch stats").await
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One question and the answer that was applied for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatExchange {
    pub question: String,
    pub answer: AnswerResponse,
}

/// A chat thread against the backend.
pub struct Conversation {
    rag: RagService,
    id: String,
    guard: RequestGuard,
    exchanges: Mutex<Vec<ChatExchange>>,
}

impl Conversation {
    /// Start a conversation with a fresh id.
    pub fn new(rag: RagService) -> Self {
        Self::resume(rag, format!("session-{}", uuid::Uuid::now_v7()))
    }

    /// Continue a conversation the backend already knows by `id`.
    pub fn resume(rag: RagService, id: impl Into<String>) -> Self {
        Self {
            rag,
            id: id.into(),
            guard: RequestGuard::new(),
            exchanges: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Everything applied so far, oldest first.
    pub fn exchanges(&self) -> Vec<ChatExchange> {
        self.exchanges
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Ask a text question.
    ///
    /// Returns `Ok(None)` when a newer question was asked (or
    /// [`abandon`](Self::abandon) was called) before this answer arrived; the
    /// late answer is not recorded.
    pub async fn ask(&self, question: &str) -> Result<Option<AnswerResponse>> {
        let ticket = self.guard.issue();
        let answer = self.rag.ask(question, Some(&self.id)).await?;
        Ok(self.apply(ticket, question.to_string(), answer))
    }

    /// Ask a recorded question. Same superseding rules as [`ask`](Self::ask).
    pub async fn ask_voice(&self, audio: &Path) -> Result<Option<AnswerResponse>> {
        let ticket = self.guard.issue();
        let answer = self.rag.ask_voice(audio, Some(&self.id)).await?;
        Ok(self.apply(ticket, VOICE_QUESTION_LABEL.to_string(), answer))
    }

    /// Drop whatever answer is still in flight.
    pub fn abandon(&self) {
        self.guard.invalidate();
    }

    fn apply(
        &self,
        ticket: crate::guard::Ticket,
        question: String,
        answer: AnswerResponse,
    ) -> Option<AnswerResponse> {
        if !self.guard.is_current(ticket) {
            info!(question_id = answer.question_id, "dropping superseded answer");
            return None;
        }
        if let Ok(mut exchanges) = self.exchanges.lock() {
            exchanges.push(ChatExchange {
                question,
                answer: answer.clone(),
            });
        }
        Some(answer)
    }
}
