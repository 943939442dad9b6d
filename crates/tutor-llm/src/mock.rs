use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tutor_core::errors::GenerationError;
use tutor_core::messages::PromptBlock;
use tutor_core::provider::Generator;

/// Pre-programmed replies for deterministic testing without a model.
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    Error(GenerationError),
    /// Wait a duration, then resolve the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock generator that returns scripted replies in order and records every
/// call's blocks.
pub struct MockGenerator {
    replies: Vec<MockReply>,
    /// Used once the script is exhausted. Without one, extra calls fail.
    fallback: Option<MockReply>,
    calls: Mutex<Vec<Vec<PromptBlock>>>,
    call_count: AtomicUsize,
}

impl MockGenerator {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            fallback: None,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Answers every call with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(MockReply::text(text)),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Blocks received on each call, oldest first.
    pub fn calls(&self) -> Vec<Vec<PromptBlock>> {
        self.calls.lock().clone()
    }

    pub fn last_call(&self) -> Option<Vec<PromptBlock>> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, blocks: &[PromptBlock]) -> Result<String, GenerationError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().push(blocks.to_vec());

        let Some(reply) = self.replies.get(idx).or(self.fallback.as_ref()).cloned() else {
            return Err(GenerationError::Failure(format!(
                "MockGenerator: no reply configured for call {idx}"
            )));
        };
        resolve(reply).await
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve(reply: MockReply) -> Result<String, GenerationError> {
    let mut current = reply;
    loop {
        match current {
            MockReply::Text(text) => return Ok(text),
            MockReply::Error(e) => return Err(e),
            MockReply::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}
