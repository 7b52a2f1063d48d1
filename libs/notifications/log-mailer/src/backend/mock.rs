//! Mock mail backend for testing

use super::{DeliveryInfo, MailBackend};
use crate::message::OutgoingMessage;
use async_trait::async_trait;
use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock backend that captures sent messages
#[derive(Clone)]
pub struct MockBackend {
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    failure_message: Option<String>,
    delay: Option<Duration>,
}

impl MockBackend {
    /// Create a new mock backend
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failure_message: None,
            delay: None,
        }
    }

    /// Create a mock backend that always fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure_message: Some(message.into()),
            ..Self::new()
        }
    }

    /// Wait before completing each send
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all sent messages
    pub async fn sent_messages(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().await.clone()
    }

    /// Get the count of sent messages
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailBackend for MockBackend {
    async fn send(&self, message: &OutgoingMessage) -> Result<DeliveryInfo> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = &self.failure_message {
            return Err(eyre::eyre!(failure.clone()));
        }

        self.sent.lock().await.push(message.clone());

        Ok(DeliveryInfo {
            envelope: message.envelope(),
            message_id: format!("mock-{}", message.id),
            message: None,
            response: Some("250 OK: queued".to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutgoingMessage {
        OutgoingMessage::new(vec!["test@example.com".into()], "from@host", "Subject", "Body")
    }

    #[tokio::test]
    async fn test_mock_backend_records_messages() {
        let backend = MockBackend::new();

        let info = backend.send(&message()).await.unwrap();
        assert!(info.message_id.starts_with("mock-"));

        let sent = backend.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["test@example.com"]);
    }

    #[tokio::test]
    async fn test_mock_backend_fails() {
        let backend = MockBackend::failing("Simulated failure");

        let result = backend.send(&message()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Simulated failure"));
        assert_eq!(backend.sent_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_backend_delay() {
        let backend = MockBackend::new().delayed(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        backend.send(&message()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
