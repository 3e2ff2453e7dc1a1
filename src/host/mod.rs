//! GitHub API client and effect interpreter.
//!
//! This module executes `HostEffect`s via the octocrab library. It implements
//! the `HostInterpreter` trait defined in the effects module.
//!
//! Key features:
//! - Exponential backoff retry for transient failures
//! - Error classification that separates write conflicts ("already exists")
//!   and permission failures from generic permanent errors
//! - Explicit response schemas for every REST payload

mod client;
mod error;
mod interpreter;
mod retry;

pub use client::{OctocrabClient, OctocrabConnector};
pub use error::{HostApiError, HostErrorKind};
pub use interpreter::interpret_host_effect;
pub use retry::{RetryConfig, RetryPolicy, RetryResult, retry_with_backoff};
