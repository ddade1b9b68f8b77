//! Logging initialisation and run summaries.

mod logging;
mod summary;

pub use logging::init_tracing;
pub use summary::run_summary;
