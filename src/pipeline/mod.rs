//! Crawl pipeline: worker fan-out, buffering, and bulk submission.

mod coordinator;
mod failure_log;
mod submitter;

pub use coordinator::{
    partition, CrawlCoordinator, CrawlSummary, FetchError, StopSignal, WorkerReport, WorkerSettings,
};
pub use failure_log::{FailedDocument, FailureSink, JsonlFailureLog, MemoryFailureLog};
pub use submitter::{BulkSubmitter, FlushReport, SubmissionGate};
