//! CLI library components for the MEDS event stream pipeline.
//!
//! The binary wires these together; integration tests drive the stages
//! through [`pipeline`] directly.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod types;
