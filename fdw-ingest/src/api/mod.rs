//! HTTP API handlers for fdw-ingest

pub mod health;
pub mod loads;
pub mod quality;
pub mod rejections;
pub mod runs;

pub use health::health_routes;
pub use loads::load_routes;
pub use quality::quality_routes;
pub use rejections::rejection_routes;
pub use runs::run_routes;
