pub mod clock;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod snapshot;
