//! Client for an OpenAI-compatible chat completions endpoint.

use crate::interfaces::{ReasoningBackend, RuntimeError};
use crate::types::Message;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Circuit breaker state.
struct CircuitBreaker {
    consecutive_failures: AtomicUsize,
    breaker_open: AtomicBool,
    opened_at: Mutex<Option<Instant>>,
    failure_threshold: usize,
    cooldown_duration: Duration,
}

impl CircuitBreaker {
    fn new(failure_threshold: usize, cooldown_duration: Duration) -> Self {
        Self {
            consecutive_failures: AtomicUsize::new(0),
            breaker_open: AtomicBool::new(false),
            opened_at: Mutex::new(None),
            failure_threshold,
            cooldown_duration,
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.breaker_open.store(false, Ordering::SeqCst);
        *self.opened_at.lock() = None;
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            self.breaker_open.store(true, Ordering::SeqCst);
            *self.opened_at.lock() = Some(Instant::now());
        }
    }

    fn should_allow_request(&self) -> Result<(), RuntimeError> {
        if !self.breaker_open.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(opened_time) = *self.opened_at.lock() {
            if opened_time.elapsed() >= self.cooldown_duration {
                // Allow trial request
                return Ok(());
            }
        }

        Err(RuntimeError::BackendUnreachable(
            "Circuit breaker open: reasoning backend unavailable".to_string(),
        ))
    }
}

/// Text-only chat client with retries and a circuit breaker.
#[derive(Clone)]
pub struct LLMClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    max_retries: u32,
    circuit_breaker: Arc<CircuitBreaker>,
    api_key: Option<String>,
}

impl LLMClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into(),
            model: model.into(),
            client,
            max_retries,
            circuit_breaker: Arc::new(CircuitBreaker::new(5, Duration::from_secs(30))),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    fn retry_delay_for_error(&self, attempt: u32, err: &RuntimeError) -> Duration {
        let msg = err.to_string().to_lowercase();
        if msg.contains("rate limit") || msg.contains("429") {
            if let Some(seconds) = extract_retry_seconds(&msg) {
                return Duration::from_secs(seconds.min(90));
            }
            return Duration::from_secs((2_u64.saturating_pow(attempt + 1)).min(30));
        }
        Duration::from_millis((250_u64.saturating_mul(2_u64.saturating_pow(attempt))).min(5000))
    }

    /// Call the backend, retrying transient failures.
    pub async fn call(
        &self,
        system_prompt: &str,
        messages: &[Message],
    ) -> Result<String, RuntimeError> {
        let _timer = crate::metrics::MetricTimer::new(crate::metrics::BACKEND_LATENCY);

        self.circuit_breaker.should_allow_request()?;

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            debug!("Backend call attempt {}/{}", attempt + 1, self.max_retries + 1);

            match self.call_once(system_prompt, messages).await {
                Ok(response) => {
                    self.circuit_breaker.record_success();
                    return Ok(response);
                }
                Err(e) => {
                    warn!("Backend call failed (attempt {}): {}", attempt + 1, e);
                    let delay = self.retry_delay_for_error(attempt, &e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.circuit_breaker.record_failure();

        Err(RuntimeError::BackendUnreachable(format!(
            "Backend call failed after {} attempts: {}",
            self.max_retries + 1,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    async fn call_once(
        &self,
        system_prompt: &str,
        messages: &[Message],
    ) -> Result<String, RuntimeError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = build_request(&self.model, system_prompt, messages);
        debug!("backend url={} messages={}", url, request.messages.len());

        let mut req_builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                RuntimeError::BackendUnreachable("Network connection failed".to_string())
            } else {
                RuntimeError::BackendUnreachable(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let error_msg = match status.as_u16() {
                401 => format!(
                    "Authentication failed. Check your API key. Details: {}",
                    error_body
                ),
                404 => format!("Invalid endpoint (404 Not Found). Details: {}", error_body),
                429 => format!("Rate limit exceeded. Details: {}", error_body),
                _ => format!("HTTP error: {}. Details: {}", status, error_body),
            };
            return Err(RuntimeError::BackendUnreachable(error_msg));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            RuntimeError::BackendUnreachable(format!("Failed to parse response: {}", e))
        })?;
        extract_content(body)
    }
}

#[async_trait]
impl ReasoningBackend for LLMClient {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
    ) -> Result<String, RuntimeError> {
        self.call(system_prompt, messages).await
    }
}

fn build_request<'a>(
    model: &'a str,
    system_prompt: &'a str,
    messages: &'a [Message],
) -> ChatRequest<'a> {
    let mut chat = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        chat.push(ChatMessage {
            role: "system",
            content: system_prompt,
        });
    }
    chat.extend(messages.iter().map(|msg| ChatMessage {
        role: msg.role.as_str(),
        content: &msg.content,
    }));
    ChatRequest {
        model,
        messages: chat,
        temperature: 0.2,
        max_tokens: 2048,
    }
}

fn extract_content(response: ChatResponse) -> Result<String, RuntimeError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| RuntimeError::BackendUnreachable("No choices in response".to_string()))?;
    if content.trim().is_empty() {
        return Err(RuntimeError::BackendUnreachable(
            "Response has empty content".to_string(),
        ));
    }
    Ok(content)
}

fn extract_retry_seconds(msg: &str) -> Option<u64> {
    for token in msg.split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '.') {
        if let Some(stripped) = token.strip_suffix('s') {
            if let Ok(v) = stripped.parse::<u64>() {
                if v > 0 {
                    return Some(v);
                }
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local_client(url: String) -> LLMClient {
        let mut client = LLMClient::new(url, "test-model", 0);
        client.client = reqwest::Client::builder().no_proxy().build().unwrap();
        client
    }

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_request_layout() {
        let messages = vec![Message::user("my wifi is slow"), Message::assistant("checking")];
        let request = build_request("gpt-4o-mini", "be careful", &messages);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be careful");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][2]["role"], "assistant");
    }

    #[test]
    fn test_empty_content_rejected() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(matches!(
            extract_content(response),
            Err(RuntimeError::BackendUnreachable(_))
        ));
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(extract_content(response).is_err());
    }

    #[test]
    fn test_extract_retry_seconds() {
        assert_eq!(extract_retry_seconds("rate limit exceeded, retry in 12s"), Some(12));
        assert_eq!(extract_retry_seconds("rate limit exceeded"), None);
    }

    #[test]
    fn test_circuit_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        assert!(breaker.should_allow_request().is_ok());
        breaker.record_failure();
        assert!(matches!(
            breaker.should_allow_request(),
            Err(RuntimeError::BackendUnreachable(_))
        ));
        breaker.record_success();
        assert!(breaker.should_allow_request().is_ok());
    }

    #[test]
    fn test_circuit_breaker_allows_trial_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert!(breaker.should_allow_request().is_ok());
    }

    #[tokio::test]
    async fn test_call_returns_message_content() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"Looks like Chrome."}}]}"#,
        )
        .await;
        let client = local_client(url).with_api_key(Some("sk-test".to_string()));
        let reply = client
            .complete("system", &[Message::user("slow laptop")])
            .await
            .unwrap();
        assert_eq!(reply, "Looks like Chrome.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"model\":\"test-model\""));
    }

    #[tokio::test]
    async fn test_http_error_is_backend_unreachable() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let client = local_client(url);
        let result = client.complete("system", &[Message::user("hi")]).await;
        match result {
            Err(RuntimeError::BackendUnreachable(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected result: {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_backend_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = local_client(format!("http://{}", addr));
        let result = client.complete("system", &[Message::user("hi")]).await;
        assert!(matches!(result, Err(RuntimeError::BackendUnreachable(_))));
    }
}
