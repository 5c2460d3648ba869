/// Core library for the Scout Engine content-discovery and draft-generation daemon.
///
/// Contains the scheduler, source-adapter framework, deduplication store,
/// agent runtime, scout executor, review bus, and persistence layer that
/// turn a declarative scout configuration into a stream of reviewed drafts.
pub mod config;
pub mod dedup;
pub mod error;
pub mod feedback;
pub mod llm;
pub mod logging;
pub mod review;
pub mod scheduler;
pub mod source;
pub mod storage;
pub mod workflow;

pub use error::*;

/// Returns the version of the scout-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
