//! # tutor-engine
//!
//! Per-learner session state for a tutoring dialogue whose model context is
//! bounded by the number of topics, never by the length of the conversation.
//!
//! - [`Curriculum`]: ordered topics plus a cursor
//! - [`extract`]: pulls the `<IS>...</IS>` understanding summary out of learner text
//! - [`SessionMemory`]: summaries, history and counters for one learner
//! - [`compose`]: builds the two-block context handed to the generator
//! - [`render`]: Markdown transcript of a session
//! - [`Tutor`]: keyed facade and the full turn pipeline

pub mod compose;
pub mod curriculum;
pub mod error;
pub mod extract;
pub mod memory;
pub mod render;
pub mod session;
pub mod store;
pub mod tutor;

pub use curriculum::{Curriculum, TopicStatus};
pub use error::EngineError;
pub use memory::SessionMemory;
pub use render::TranscriptOptions;
pub use session::{LearnerSession, Progress, SessionFlags};
pub use store::MemoryStore;
pub use tutor::{Tutor, TutorConfig, TurnOutcome};
