pub mod brain_dump;
pub mod metrics;
pub mod overlay;
pub mod streak;
pub mod tasks_sync;
pub mod timer;
