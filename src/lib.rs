//! Imageboard filter watcher.
//!
//! Periodically loads the catalogs of boards targeted by watch filters,
//! pins threads whose posts match, and remembers what it already pinned so
//! the same post is never pinned twice.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod db;
pub mod filter;
pub mod ignore;
pub mod model;
pub mod state;
pub mod watch;
