use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutor_core::errors::GenerationError;
use tutor_core::messages::PromptBlock;
use tutor_core::provider::Generator;

#[derive(Clone, Debug)]
pub struct ChatCompletionsConfig {
    /// Full URL of the `/v1/chat/completions` endpoint.
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout: Duration,
}

impl Default for ChatCompletionsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/v1/chat/completions".into(),
            model: "mlx-community/gemma-2-9b-it-4bit".into(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Generator backed by any OpenAI-compatible chat endpoint
/// (`mlx_lm.server`, llama.cpp, vLLM, ...).
pub struct ChatCompletionsGenerator {
    client: Client,
    config: ChatCompletionsConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    pub fn new(config: ChatCompletionsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_body<'a>(&'a self, blocks: &'a [PromptBlock]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: blocks
                .iter()
                .map(|b| ChatMessage {
                    role: b.role.chat_role(),
                    content: &b.content,
                })
                .collect(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        }
    }

    fn classify(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(self.config.timeout)
        } else if err.is_connect() {
            GenerationError::Unavailable(err.to_string())
        } else {
            GenerationError::Failure(err.to_string())
        }
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        "chat_completions"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, blocks), fields(model = %self.config.model, endpoint = %self.config.endpoint))]
    async fn generate(&self, blocks: &[PromptBlock]) -> Result<String, GenerationError> {
        let resp = self
            .client
            .post(&self.config.endpoint)
            .timeout(self.config.timeout)
            .json(&self.request_body(blocks))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status, body));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| self.classify(e))?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    /// Serves `router` on an ephemeral port and returns the endpoint URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn generator(endpoint: String, timeout: Duration) -> ChatCompletionsGenerator {
        ChatCompletionsGenerator::new(ChatCompletionsConfig {
            endpoint,
            model: "test-model".into(),
            timeout,
            ..Default::default()
        })
    }

    fn blocks() -> Vec<PromptBlock> {
        vec![
            PromptBlock::system("You are a patient tutor."),
            PromptBlock::learner("What is NACL?"),
        ]
    }

    #[tokio::test]
    async fn sends_roles_and_reads_first_choice() {
        let seen = Arc::new(Mutex::new(None::<Value>));
        let captured = seen.clone();
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock() = Some(body);
                    Json(json!({"choices": [{"message": {"role": "assistant", "content": "  A stateless firewall.  "}}]}))
                }
            }),
        );
        let endpoint = serve(router).await;

        let reply = generator(endpoint, Duration::from_secs(5))
            .generate(&blocks())
            .await
            .unwrap();
        assert_eq!(reply, "A stateless firewall.");

        let body = seen.lock().clone().unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What is NACL?");
    }

    #[tokio::test]
    async fn non_success_status_is_classified() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "loading model") }),
        );
        let endpoint = serve(router).await;
        let err = generator(endpoint, Duration::from_secs(5))
            .generate(&blocks())
            .await
            .unwrap_err();
        match err {
            GenerationError::Unavailable(msg) => assert_eq!(msg, "status 503: loading model"),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_empty_response() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let endpoint = serve(router).await;
        let err = generator(endpoint, Duration::from_secs(5))
            .generate(&blocks())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"choices": []}))
            }),
        );
        let endpoint = serve(router).await;
        let err = generator(endpoint, Duration::from_millis(100))
            .generate(&blocks())
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = generator(format!("http://{addr}/v1/chat/completions"), Duration::from_secs(2))
            .generate(&blocks())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)), "got {err:?}");
    }
}
