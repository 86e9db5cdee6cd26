//! Domain types for fact loading

pub mod dimension;
pub mod fact_record;
pub mod outcome;
pub mod summary;

pub use dimension::{Dimension, DimensionKeySet, DimensionSnapshot};
pub use fact_record::{FactRecord, FlightMeasures, MalformedField, NaturalKey};
pub use outcome::{LoadOutcome, RejectionReason};
pub use summary::RunSummary;
