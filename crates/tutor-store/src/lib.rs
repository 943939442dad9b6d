pub mod database;
pub mod error;
pub mod learners;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod turns;

pub use database::Database;
pub use error::StoreError;
pub use learners::{LearnerRepo, LearnerRow};
pub use sessions::{LearningSessionRow, SessionRepo};
pub use turns::{TurnRepo, TurnRow};
