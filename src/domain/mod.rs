pub mod models;
pub mod plan;
pub mod progress;
pub mod streak;
