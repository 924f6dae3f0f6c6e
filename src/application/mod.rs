pub mod bootstrap;
pub mod chat;
pub mod clock;
pub mod commands;
pub mod flashcards;
pub mod progress;
pub mod session;
pub mod streak;
pub mod study_plan;
