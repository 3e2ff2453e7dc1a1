//! Effects-as-data for host operations.
//!
//! Host operations are described as values (`HostEffect`) and executed by an
//! interpreter. This enables:
//! - Orchestration logic that is testable via mock interpreters
//! - Logging/tracing of intended operations
//! - A single place where retry and error classification happen

pub mod host;
pub mod interpreter;
pub mod ops;

pub use host::{
    HostEffect, HostResponse, MergeGates, MergeMethod, StateFilter, StatusChecks, TagData,
};
pub use interpreter::{HostConnector, HostInterpreter};
