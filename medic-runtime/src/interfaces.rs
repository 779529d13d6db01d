//! Abstract interfaces for runtime dependencies.

use crate::types::Message;
use async_trait::async_trait;
use thiserror::Error;

/// Runtime errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Reasoning backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Free-text reasoning backend.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Produce the next assistant message for a conversation.
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
    ) -> Result<String, RuntimeError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoBackend {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReasoningBackend for EchoBackend {
        async fn complete(
            &self,
            system_prompt: &str,
            messages: &[Message],
        ) -> Result<String, RuntimeError> {
            self.prompts.lock().unwrap().push(system_prompt.to_string());
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_backend_trait_object() {
        let backend: Box<dyn ReasoningBackend> = Box::new(EchoBackend {
            prompts: Mutex::new(Vec::new()),
        });
        let reply = backend
            .complete("system", &[Message::user("ping")])
            .await
            .unwrap();
        assert_eq!(reply, "ping");
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::SessionError("test error".to_string());
        assert_eq!(err.to_string(), "Session error: test error");

        let err = RuntimeError::BackendUnreachable("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "Reasoning backend unreachable: connection refused"
        );
    }
}
