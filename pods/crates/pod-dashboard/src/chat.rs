use futures::future::{AbortRegistration, Abortable};
use pod_net::ChatBackend;
use pod_types::chat::{AskResponse, Rating};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

const INJECTION_MARKER: &str = "[[CRITICAL UPDATE";
const SOURCE_DISPLAY_MAX: usize = 40;
const SOURCE_DISPLAY_KEEP: usize = 37;

pub const EMPTY_RESPONSE: &str = "Received empty response from server.";
pub const STOPPED_BY_USER: &str = "Generation stopped by user.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    System,
    Error,
}

/// A cited source with its shortened label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceView {
    pub full: String,
    pub display: String,
}

impl SourceView {
    pub fn new(source: &str) -> Self {
        let display = if source.chars().count() > SOURCE_DISPLAY_MAX {
            let head: String = source.chars().take(SOURCE_DISPLAY_KEEP).collect();
            format!("{}...", head)
        } else {
            source.to_string()
        };
        Self {
            full: source.to_string(),
            display,
        }
    }
}

/// One entry of the chat transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub kind: MessageKind,
    pub text: String,
    pub sources: Vec<SourceView>,
    /// Present on answers that accept feedback
    pub request_id: Option<String>,
}

impl ChatMessage {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            sources: Vec::new(),
            request_id: None,
        }
    }
}

/// Drop every paragraph carrying an injected update marker
pub fn strip_injected_paragraphs(answer: &str) -> String {
    answer
        .split("\n\n")
        .filter(|paragraph| !paragraph.to_uppercase().contains(INJECTION_MARKER))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Chat transcript bound to a backend
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Ask a question; the request is dropped when `registration`'s handle aborts.
    ///
    /// Returns the message appended for the outcome, or `None` for blank input.
    pub async fn ask(&mut self, question: &str, registration: AbortRegistration) -> Option<&ChatMessage> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }

        self.messages.push(ChatMessage::new(MessageKind::User, question));

        let outcome = Abortable::new(self.backend.ask(question), registration).await;
        let reply = match outcome {
            Err(_aborted) => {
                debug!("Chat request aborted");
                ChatMessage::new(MessageKind::System, STOPPED_BY_USER)
            }
            Ok(Err(e)) => {
                warn!("Chat request failed: {}", e);
                ChatMessage::new(MessageKind::Error, format!("Error connecting to AI: {}", e))
            }
            Ok(Ok(response)) => answer_message(response),
        };

        self.messages.push(reply);
        self.messages.last()
    }

    /// Rate an answer; failures are logged and otherwise ignored
    pub async fn feedback(&self, request_id: &str, rating: Rating) {
        if request_id.is_empty() {
            return;
        }
        if let Err(e) = self.backend.send_feedback(request_id, rating).await {
            warn!("Failed to send feedback for {}: {}", request_id, e);
        }
    }
}

fn answer_message(response: AskResponse) -> ChatMessage {
    let answer = match response.answer {
        Some(answer) if !answer.trim().is_empty() => answer,
        _ => return ChatMessage::new(MessageKind::Error, EMPTY_RESPONSE),
    };

    ChatMessage {
        kind: MessageKind::Assistant,
        text: strip_injected_paragraphs(&answer),
        sources: response.sources.iter().map(|s| SourceView::new(s)).collect(),
        request_id: response.request_id,
    }
}
