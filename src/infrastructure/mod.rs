pub mod config;
pub mod error;
pub mod google_tasks_client;
pub mod overlay_module;
pub mod scheduler;
pub mod sort_client;
pub mod storage;
pub mod token_store;
pub mod transcribe_client;
