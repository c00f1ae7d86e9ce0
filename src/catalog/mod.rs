//! Board catalog loading.

pub mod comment;
pub mod http;

pub use http::HttpCatalogFetcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{BoardRef, CatalogSnapshot};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no api base configured for site {0}")]
    UnknownSite(String),
    #[error("invalid catalog url for {board}: {source}")]
    Url {
        board: BoardRef,
        #[source]
        source: url::ParseError,
    },
    #[error("request for {board} failed: {source}")]
    Request {
        board: BoardRef,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog fetch for {board} failed with status {status}")]
    Status { board: BoardRef, status: u16 },
    #[error("malformed catalog for {board}: {source}")]
    Decode {
        board: BoardRef,
        #[source]
        source: serde_json::Error,
    },
    #[error("catalog fetch for {board} timed out")]
    Timeout { board: BoardRef },
    #[error("catalog fetch for {board} panicked")]
    Panicked { board: BoardRef },
}

/// Produces a fresh catalog snapshot for a board.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Load the current catalog of `board`.
    async fn fetch(&self, board: &BoardRef) -> Result<CatalogSnapshot, FetchError>;
}
