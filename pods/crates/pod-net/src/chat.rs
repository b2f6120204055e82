use crate::error::{map_reqwest_error, status_error, PodNetResult};
use async_trait::async_trait;
use pod_types::chat::{AskRequest, AskResponse, FeedbackRequest, Rating};
use reqwest::Client;
use tracing::debug;

/// Backend answering chat questions
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Ask a question and wait for the full answer
    async fn ask(&self, question: &str) -> PodNetResult<AskResponse>;

    /// Rate a previous answer
    async fn send_feedback(&self, request_id: &str, rating: Rating) -> PodNetResult<()>;
}

/// REST client for the chat service
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn ask(&self, question: &str) -> PodNetResult<AskResponse> {
        let url = format!("{}/ask", self.base_url);
        debug!("Posting question to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&AskRequest {
                question: question.to_string(),
            })
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("Chat server", status));
        }

        Ok(response.json::<AskResponse>().await?)
    }

    async fn send_feedback(&self, request_id: &str, rating: Rating) -> PodNetResult<()> {
        let url = format!("{}/feedback", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&FeedbackRequest {
                request_id: request_id.to_string(),
                rating,
            })
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("Chat server", status));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PodNetError;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_ask() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ask")
            .match_body(Matcher::Json(json!({"question": "how many pods?"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "answer": "About **120**.",
                    "sources": ["https://docs.example.org/pods"],
                    "request_id": "req-1"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ChatClient::new(Client::new(), server.url());
        let answer = client.ask("how many pods?").await.unwrap();

        mock.assert_async().await;
        assert_eq!(answer.answer.as_deref(), Some("About **120**."));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_ask_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ask")
            .with_status(502)
            .create_async()
            .await;

        let client = ChatClient::new(Client::new(), server.url());
        let err = client.ask("hello").await.unwrap_err();
        assert!(matches!(err, PodNetError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_send_feedback() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/feedback")
            .match_body(Matcher::Json(json!({"request_id": "req-1", "rating": "down"})))
            .with_status(204)
            .create_async()
            .await;

        let client = ChatClient::new(Client::new(), server.url());
        client.send_feedback("req-1", Rating::Down).await.unwrap();
        mock.assert_async().await;
    }
}
