use async_trait::async_trait;

use crate::errors::GenerationError;
use crate::messages::PromptBlock;

/// The generation collaborator: turns an ordered list of role-tagged blocks
/// into one reply. Timeouts belong to the implementation.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn generate(&self, blocks: &[PromptBlock]) -> Result<String, GenerationError>;

    /// Whether the backing model is reachable. Defaults to optimistic.
    async fn health_check(&self) -> bool {
        true
    }
}
