pub mod chat_completions;
pub mod gemma;
pub mod mlx;

pub mod mock;

pub use chat_completions::{ChatCompletionsConfig, ChatCompletionsGenerator};
pub use mlx::{MlxConfig, MlxGenerator};
pub use mock::{MockGenerator, MockReply};
