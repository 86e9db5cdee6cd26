//! Chunked fact loading
//!
//! Validates parsed flight records against a dimension snapshot, writes the
//! accepted ones through an insert-or-ignore sink and records everything
//! else as a rejection. Run accounting lives in `pipeline_runs`.

mod chunked;
pub mod ports;
pub mod retry;
pub mod validator;

pub use chunked::{ChunkedFactLoader, LoadControl, DEFAULT_CHUNK_SIZE};
pub use ports::{DimensionLookup, FactSink, RejectionSink, RunTracker};
pub use retry::RetryPolicy;
pub use validator::{ChunkPartition, RecordValidator};
