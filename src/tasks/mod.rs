//! Background Tasks Module
//!
//! Contains the background work a cache runs on behalf of its callers.
//!
//! # Tasks
//! - Refresh: Runs one loader call for an entry and records its outcome

mod refresh;

pub use refresh::{spawn_refresh, Refresher};
