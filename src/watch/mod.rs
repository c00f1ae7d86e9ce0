//! Filter-watch polling: the coordinator, its collaborators, and the
//! periodic scheduler that drives it.

pub mod coordinator;
pub mod keep_alive;
pub mod schedule;

pub use coordinator::{
    Collaborators, Coordinator, CoordinatorOptions, CycleReport, CycleTicket, FastPathOutcome,
    TriggerOutcome,
};
pub use keep_alive::{KeepAlive, KeepAliveToken, LoggingKeepAlive};

use anyhow::Result;
use async_trait::async_trait;

use crate::filter::SavedBoards;
use crate::model::{BoardRef, PinType, ThreadRef};

/// A request to start watching a thread because one of its posts matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRequest {
    pub thread: ThreadRef,
    /// Post that triggered the pin.
    pub post_no: u64,
    pub subject: Option<String>,
    pub pin_type: PinType,
}

/// Accepts pin requests. Must be idempotent per thread.
#[async_trait]
pub trait PinSink: Send + Sync {
    /// Create a pin unless the thread is already pinned. Returns `true` if a
    /// new pin was created.
    async fn create_pin_if_absent(&self, request: &PinRequest) -> Result<bool>;
}

/// Lists every board the user has saved, grouped by site.
pub trait BoardSource: Send + Sync {
    fn all_saved_boards(&self) -> Vec<(String, Vec<BoardRef>)>;
}

impl BoardSource for SavedBoards {
    fn all_saved_boards(&self) -> Vec<(String, Vec<BoardRef>)> {
        self.by_site().to_vec()
    }
}
