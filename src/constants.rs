//! Shared constants used across the application.

/// User agent sent with catalog requests unless overridden.
pub const DEFAULT_USER_AGENT: &str = "chan-filter-watch/0.1";

/// State slot holding the JSON-encoded ignore set.
pub const IGNORE_SET_KEY: &str = "filter_watch_ignored";

/// Default bound on the ignore set.
pub const DEFAULT_IGNORE_CAPACITY: usize = 650;
