pub mod state;
pub mod worker;

pub use worker::{normalize_language, SegmentWorker, WorkerOutcome};
