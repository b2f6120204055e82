use serde::{Deserialize, Serialize};
use std::fmt;

/// Question posted to the chat backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Answer returned by the chat backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub answer: Option<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub request_id: Option<String>,
}

/// Thumbs up or down on an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Up,
    Down,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Up => f.write_str("up"),
            Rating::Down => f.write_str("down"),
        }
    }
}

/// Feedback posted for a previous answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub rating: Rating,
}
