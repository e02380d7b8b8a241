//! Shared domain types for the DataFlow control console.
//!
//! Mirrors the wire model of the job/pipeline platform API so that the
//! pull client, the live synchronization layer, and the console binary
//! agree on one set of types.

pub mod dashboard;
pub mod endpoints;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod run;
pub mod types;
