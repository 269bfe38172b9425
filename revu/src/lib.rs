//! revu — browser-based multi-round review of agent edits.
//!
//! The binary wires the review core (`revu-core`) to an HTTP API, a git
//! worker thread and the user's config file.

pub mod config;
pub mod git;
pub mod server;
pub mod signals;
