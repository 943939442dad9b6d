pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod server;

pub use error::ApiError;
pub use orchestrator::LearningOrchestrator;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
