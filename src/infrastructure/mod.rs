pub mod config;
pub mod document_mapper;
pub mod document_store;
pub mod error;
pub mod inference_client;
pub mod logging;
pub mod storage;
pub mod streak_store;
