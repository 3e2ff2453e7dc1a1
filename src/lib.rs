//! merge-warden - reconciles change request activity on a source-control host
//! with labels, issue tracker tickets, chat notifications and release tags.
//!
//! The library holds the engine and its collaborators; the binary wires them
//! to GitHub, Jira and a Lark-style chat and runs the poll loop next to the
//! HTTP surface.

pub mod chat;
pub mod clock;
pub mod config;
pub mod confirm;
pub mod effects;
pub mod engine;
pub mod git;
pub mod host;
pub mod linker;
pub mod notify;
pub mod reconcile;
pub mod release;
pub mod server;
pub mod store;
pub mod tracker;
pub mod types;
pub mod worker;

#[cfg(test)]
pub mod test_utils;
