//! Catalog fetcher for 4chan-compatible JSON APIs (`{api_base}/{board}/catalog.json`).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::comment::html_to_text;
use super::{CatalogFetcher, FetchError};
use crate::model::{BoardRef, CatalogSnapshot, PostSnapshot};

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    threads: Vec<CatalogPost>,
}

#[derive(Debug, Deserialize)]
struct CatalogPost {
    no: u64,
    sub: Option<String>,
    com: Option<String>,
    name: Option<String>,
    trip: Option<String>,
    id: Option<String>,
    filename: Option<String>,
    ext: Option<String>,
    #[serde(default)]
    last_replies: Vec<CatalogPost>,
}

impl CatalogPost {
    fn into_snapshot(self, op_no: u64) -> (PostSnapshot, Vec<CatalogPost>) {
        let is_op = self.no == op_no;
        let filename = match (self.filename, self.ext) {
            (Some(name), Some(ext)) => Some(format!("{name}{ext}")),
            (name, _) => name,
        };
        let snapshot = PostSnapshot {
            no: self.no,
            op_no,
            is_op,
            // Only threads can be pinned.
            filter_watch: is_op,
            subject: self.sub.as_deref().map(html_to_text),
            comment: self.com.as_deref().map(html_to_text),
            name: self.name,
            tripcode: self.trip,
            poster_id: self.id,
            filename,
        };
        (snapshot, self.last_replies)
    }
}

/// Flatten catalog pages into OP posts followed by their last replies.
fn flatten(pages: Vec<CatalogPage>) -> Vec<PostSnapshot> {
    let mut posts = Vec::new();
    for thread in pages.into_iter().flat_map(|page| page.threads) {
        let op_no = thread.no;
        let (op, replies) = thread.into_snapshot(op_no);
        posts.push(op);
        posts.extend(
            replies
                .into_iter()
                .map(|reply| reply.into_snapshot(op_no).0),
        );
    }
    posts
}

/// HTTP catalog fetcher keyed by site id.
#[derive(Debug, Clone)]
pub struct HttpCatalogFetcher {
    client: reqwest::Client,
    api_bases: HashMap<String, Url>,
}

impl HttpCatalogFetcher {
    /// Create a fetcher for the given sites.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_bases: HashMap<String, Url>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        let api_bases = api_bases
            .into_iter()
            .map(|(site, mut base)| {
                // Url::join replaces the last segment unless the path ends in '/'.
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                (site, base)
            })
            .collect();

        Ok(Self { client, api_bases })
    }

    fn catalog_url(&self, board: &BoardRef) -> Result<Url, FetchError> {
        let base = self
            .api_bases
            .get(&board.site)
            .ok_or_else(|| FetchError::UnknownSite(board.site.clone()))?;
        base.join(&format!("{}/catalog.json", board.code))
            .map_err(|source| FetchError::Url {
                board: board.clone(),
                source,
            })
    }
}

#[async_trait]
impl CatalogFetcher for HttpCatalogFetcher {
    async fn fetch(&self, board: &BoardRef) -> Result<CatalogSnapshot, FetchError> {
        let url = self.catalog_url(board)?;
        debug!(board = %board, url = %url, "Fetching catalog");

        let request_error = |source| FetchError::Request {
            board: board.clone(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                board: board.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        let pages: Vec<CatalogPage> =
            serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                board: board.clone(),
                source,
            })?;

        let posts = flatten(pages);
        debug!(board = %board, posts = posts.len(), "Catalog loaded");
        Ok(CatalogSnapshot::new(board.clone(), posts))
    }
}
