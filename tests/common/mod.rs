//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

use chan_filter_watch::catalog::{CatalogFetcher, FetchError};
use chan_filter_watch::constants::IGNORE_SET_KEY;
use chan_filter_watch::filter::{FilterEngine, FilterField, FilterRule, FilterScope};
use chan_filter_watch::model::{BoardRef, CatalogSnapshot, PostSnapshot};
use chan_filter_watch::state::{MemoryStateStore, StateStore};
use chan_filter_watch::watch::{
    BoardSource, Collaborators, Coordinator, CoordinatorOptions, LoggingKeepAlive, PinRequest,
    PinSink,
};

pub fn board(code: &str) -> BoardRef {
    BoardRef::new("4chan", code)
}

/// OP post with a subject.
pub fn op(no: u64, subject: &str) -> PostSnapshot {
    PostSnapshot {
        subject: Some(subject.to_string()),
        ..PostSnapshot::op(no)
    }
}

/// Watch rule on the subject field for the given boards.
pub fn subject_rule(pattern: &str, boards: &[BoardRef]) -> FilterRule {
    FilterRule::watch(
        pattern,
        vec![FilterField::Subject],
        FilterScope::Boards(boards.to_vec()),
    )
}

pub enum Script {
    Posts(Vec<PostSnapshot>),
    Delayed(Duration, Vec<PostSnapshot>),
    Fail,
    Hang,
    Panic,
}

/// Catalog fetcher answering from a per-board script. With a gate, every
/// fetch waits for one permit before answering.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<BoardRef, Script>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, board: BoardRef, script: Script) -> Self {
        self.scripts.insert(board, script);
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogFetcher for ScriptedFetcher {
    async fn fetch(&self, board: &BoardRef) -> Result<CatalogSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        match self.scripts.get(board) {
            Some(Script::Posts(posts)) => Ok(CatalogSnapshot::new(board.clone(), posts.clone())),
            Some(Script::Delayed(delay, posts)) => {
                tokio::time::sleep(*delay).await;
                Ok(CatalogSnapshot::new(board.clone(), posts.clone()))
            }
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Panic) => panic!("catalog fetch for {board} blew up"),
            Some(Script::Fail) | None => Err(FetchError::Status {
                board: board.clone(),
                status: 500,
            }),
        }
    }
}

/// Pin sink recording every request; idempotent per thread. Panics on the
/// post number given to `panicking_on`.
#[derive(Default)]
pub struct RecordingPinSink {
    requests: Mutex<Vec<PinRequest>>,
    panic_on: Option<u64>,
}

impl RecordingPinSink {
    pub fn panicking_on(post_no: u64) -> Self {
        Self {
            panic_on: Some(post_no),
            ..Self::default()
        }
    }

    pub async fn requests(&self) -> Vec<PinRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn requested_posts(&self) -> Vec<u64> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|request| request.post_no)
            .collect()
    }
}

#[async_trait]
impl PinSink for RecordingPinSink {
    async fn create_pin_if_absent(&self, request: &PinRequest) -> Result<bool> {
        if self.panic_on == Some(request.post_no) {
            panic!("pin store blew up on {}", request.post_no);
        }
        let mut requests = self.requests.lock().await;
        let exists = requests.iter().any(|r| r.thread == request.thread);
        requests.push(request.clone());
        Ok(!exists)
    }
}

/// State store counting writes. With `panic_on_put`, every write panics.
#[derive(Default)]
pub struct CountingStateStore {
    inner: MemoryStateStore,
    puts: AtomicUsize,
    panic_on_put: bool,
}

impl CountingStateStore {
    pub fn with_ignored(json: &str) -> Self {
        Self {
            inner: MemoryStateStore::with_slot(IGNORE_SET_KEY, json),
            ..Self::default()
        }
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn ignored_json(&self) -> Option<String> {
        self.inner.get(IGNORE_SET_KEY).await.unwrap()
    }
}

#[async_trait]
impl StateStore for CountingStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_put {
            panic!("state store blew up writing {key}");
        }
        self.inner.put(key, value).await
    }
}

pub struct StaticBoards(pub Vec<BoardRef>);

impl BoardSource for StaticBoards {
    fn all_saved_boards(&self) -> Vec<(String, Vec<BoardRef>)> {
        vec![("4chan".to_string(), self.0.clone())]
    }
}

pub struct Harness {
    pub coordinator: Coordinator,
    pub filters: Arc<FilterEngine>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub pins: Arc<RecordingPinSink>,
    pub keep_alive: Arc<LoggingKeepAlive>,
    pub state: Arc<CountingStateStore>,
}

pub struct HarnessBuilder {
    rules: Vec<FilterRule>,
    saved: Vec<BoardRef>,
    fetcher: ScriptedFetcher,
    pins: RecordingPinSink,
    state: CountingStateStore,
    options: CoordinatorOptions,
}

impl HarnessBuilder {
    pub fn new(rules: Vec<FilterRule>, fetcher: ScriptedFetcher) -> Self {
        Self {
            rules,
            saved: Vec::new(),
            fetcher,
            pins: RecordingPinSink::default(),
            state: CountingStateStore::default(),
            options: CoordinatorOptions::default(),
        }
    }

    pub fn saved_boards(mut self, saved: Vec<BoardRef>) -> Self {
        self.saved = saved;
        self
    }

    pub fn ignored(mut self, json: &str) -> Self {
        self.state = CountingStateStore {
            panic_on_put: self.state.panic_on_put,
            ..CountingStateStore::with_ignored(json)
        };
        self
    }

    pub fn pins(mut self, pins: RecordingPinSink) -> Self {
        self.pins = pins;
        self
    }

    pub fn state_panics_on_put(mut self) -> Self {
        self.state.panic_on_put = true;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.options.ignore_capacity = capacity;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.options.fetch_timeout = timeout;
        self
    }

    pub async fn build(self) -> Harness {
        let filters = Arc::new(FilterEngine::new(self.rules));
        let fetcher = Arc::new(self.fetcher);
        let pins = Arc::new(self.pins);
        let keep_alive = Arc::new(LoggingKeepAlive::new());
        let state = Arc::new(self.state);

        let coordinator = Coordinator::new(
            Arc::clone(&filters),
            Collaborators {
                fetcher: fetcher.clone(),
                pins: pins.clone(),
                boards: Arc::new(StaticBoards(self.saved)),
                keep_alive: keep_alive.clone(),
                state: state.clone(),
            },
            self.options,
        )
        .await;

        Harness {
            coordinator,
            filters,
            fetcher,
            pins,
            keep_alive,
            state,
        }
    }
}
