//! Fan-out/fan-in filter-watch poll coordinator.
//!
//! A cycle fetches every board targeted by an enabled watch filter, pins the
//! threads whose posts match, and finally prunes the ignore set down to the
//! posts observed during the cycle. At most one cycle runs at a time.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::{oneshot, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::keep_alive::{KeepAlive, KeepAliveToken};
use super::{BoardSource, PinRequest, PinSink};
use crate::catalog::{CatalogFetcher, FetchError};
use crate::config::Config;
use crate::constants::DEFAULT_IGNORE_CAPACITY;
use crate::filter::{FilterEngine, FilterRule};
use crate::ignore::{IgnoreLedger, IgnoreSet};
use crate::model::{BoardRef, CatalogSnapshot, PinType, PostSnapshot};
use crate::state::StateStore;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    pub ignore_capacity: usize,
    /// A fetch running longer than this counts as failed.
    pub fetch_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            ignore_capacity: DEFAULT_IGNORE_CAPACITY,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for CoordinatorOptions {
    fn from(config: &Config) -> Self {
        Self {
            ignore_capacity: config.ignore_capacity,
            fetch_timeout: config.fetch_timeout,
        }
    }
}

/// External services the coordinator calls into.
pub struct Collaborators {
    pub fetcher: Arc<dyn CatalogFetcher>,
    pub pins: Arc<dyn PinSink>,
    pub boards: Arc<dyn BoardSource>,
    pub keep_alive: Arc<dyn KeepAlive>,
    pub state: Arc<dyn StateStore>,
}

/// Summary of a finished cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub boards: Vec<BoardRef>,
    pub failed_boards: Vec<BoardRef>,
    pub posts_seen: usize,
    pub pins_requested: usize,
    pub pins_created: usize,
    /// Ignore set size after pruning.
    pub ignored: usize,
}

/// Handle to a started cycle.
#[derive(Debug)]
pub struct CycleTicket {
    pub cycle: u64,
    pub boards: Vec<BoardRef>,
    done: oneshot::Receiver<CycleReport>,
}

impl CycleTicket {
    /// Wait for the cycle to finalize. `None` if it was cancelled.
    pub async fn wait(self) -> Option<CycleReport> {
        self.done.await.ok()
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Started(CycleTicket),
    /// A cycle is already running; the trigger was ignored.
    AlreadyPolling,
    /// No enabled watch filter targets any board.
    NoBoards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPathOutcome {
    /// A cycle was running, nothing was scanned.
    Skipped,
    Scanned {
        pins_requested: usize,
        pins_created: usize,
    },
}

struct PollCycle {
    id: u64,
    outstanding: usize,
    filters: Vec<FilterRule>,
    observed: HashSet<u64>,
    in_flight: HashMap<BoardRef, AbortHandle>,
    report: CycleReport,
    done: oneshot::Sender<CycleReport>,
    keep_alive: KeepAliveToken,
}

struct State {
    ledger: IgnoreLedger,
    cycle: Option<PollCycle>,
}

struct Inner {
    filters: Arc<FilterEngine>,
    fetcher: Arc<dyn CatalogFetcher>,
    pins: Arc<dyn PinSink>,
    boards: Arc<dyn BoardSource>,
    keep_alive: Arc<dyn KeepAlive>,
    fetch_timeout: Duration,
    /// Single-flight gate. Set before any fetch is spawned, cleared after finalize.
    polling: AtomicBool,
    next_cycle: AtomicU64,
    state: Mutex<State>,
}

/// Drives filter-watch poll cycles. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Build a coordinator, loading the persisted ignore set.
    pub async fn new(
        filters: Arc<FilterEngine>,
        collaborators: Collaborators,
        options: CoordinatorOptions,
    ) -> Self {
        let ledger = IgnoreLedger::load(collaborators.state, options.ignore_capacity).await;
        Self {
            inner: Arc::new(Inner {
                filters,
                fetcher: collaborators.fetcher,
                pins: collaborators.pins,
                boards: collaborators.boards,
                keep_alive: collaborators.keep_alive,
                fetch_timeout: options.fetch_timeout,
                polling: AtomicBool::new(false),
                next_cycle: AtomicU64::new(0),
                state: Mutex::new(State {
                    ledger,
                    cycle: None,
                }),
            }),
        }
    }

    /// Start a cycle unless one is already running.
    pub async fn trigger(&self) -> TriggerOutcome {
        let inner = &self.inner;
        if inner
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Filter watch cycle already running, ignoring trigger");
            return TriggerOutcome::AlreadyPolling;
        }

        let keep_alive = inner.keep_alive.acquire();
        let filters = inner.filters.enabled_watch_filters();
        let boards = FilterEngine::watched_boards(&filters, || {
            inner
                .boards
                .all_saved_boards()
                .into_iter()
                .flat_map(|(_, boards)| boards)
                .collect()
        });

        if boards.is_empty() {
            debug!(filters = filters.len(), "No boards targeted by watch filters");
            drop(keep_alive);
            inner.polling.store(false, Ordering::Release);
            return TriggerOutcome::NoBoards;
        }

        let id = inner.next_cycle.fetch_add(1, Ordering::Relaxed) + 1;
        let (done_tx, done_rx) = oneshot::channel();

        // Completions block on this lock until the cycle is fully installed.
        let mut state = inner.state.lock().await;
        let mut cycle = PollCycle {
            id,
            outstanding: boards.len(),
            filters,
            observed: HashSet::new(),
            in_flight: HashMap::with_capacity(boards.len()),
            report: CycleReport {
                cycle: id,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                boards: boards.clone(),
                failed_boards: Vec::new(),
                posts_seen: 0,
                pins_requested: 0,
                pins_created: 0,
                ignored: 0,
            },
            done: done_tx,
            keep_alive,
        };
        for board in &boards {
            let task = tokio::spawn(Arc::clone(inner).fetch_and_complete(id, board.clone()));
            cycle.in_flight.insert(board.clone(), task.abort_handle());
        }
        state.cycle = Some(cycle);
        drop(state);

        info!(cycle = id, boards = boards.len(), "Filter watch cycle started");
        TriggerOutcome::Started(CycleTicket {
            cycle: id,
            boards,
            done: done_rx,
        })
    }

    /// Scan a catalog that was loaded outside of a cycle.
    ///
    /// Matches are pinned and the ignore set only grows. Skipped entirely
    /// while a cycle is running.
    pub async fn on_catalog_loaded(&self, snapshot: &CatalogSnapshot) -> FastPathOutcome {
        let inner = &self.inner;
        if inner.polling.load(Ordering::Acquire) {
            debug!(board = %snapshot.board, "Cycle running, skipping catalog scan");
            return FastPathOutcome::Skipped;
        }

        let filters = inner.filters.enabled_watch_filters();
        let mut guard = inner.state.lock().await;
        if guard.cycle.is_some() || inner.polling.load(Ordering::Acquire) {
            debug!(board = %snapshot.board, "Cycle running, skipping catalog scan");
            return FastPathOutcome::Skipped;
        }
        let state = &mut *guard;

        let matched = collect_matches(&filters, &snapshot.posts, state.ledger.set());
        if matched.is_empty() {
            return FastPathOutcome::Scanned {
                pins_requested: 0,
                pins_created: 0,
            };
        }

        let pins_created = inner.request_pins(&snapshot.board, &matched).await;
        state
            .ledger
            .set_mut()
            .add_all(matched.iter().map(|post| post.no));
        if let Err(e) = state.ledger.persist().await {
            warn!("{e:#}");
        }

        debug!(
            board = %snapshot.board,
            matched = matched.len(),
            pins_created,
            ignored = state.ledger.set().len(),
            "Scanned loaded catalog"
        );
        FastPathOutcome::Scanned {
            pins_requested: matched.len(),
            pins_created,
        }
    }

    /// Abort the running cycle without pruning. Returns whether one was running.
    pub async fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(cycle) = state.cycle.take() else {
            return false;
        };
        for handle in cycle.in_flight.values() {
            handle.abort();
        }
        self.inner.polling.store(false, Ordering::Release);
        warn!(
            cycle = cycle.id,
            outstanding = cycle.outstanding,
            "Filter watch cycle cancelled"
        );
        true
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.inner.polling.load(Ordering::Acquire)
    }

    /// Ignored post numbers, sorted.
    pub async fn ignored(&self) -> Vec<u64> {
        let state = self.inner.state.lock().await;
        let mut ids: Vec<u64> = state.ledger.set().iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Boards whose fetch has not completed in the running cycle.
    pub async fn in_flight_boards(&self) -> Vec<BoardRef> {
        let state = self.inner.state.lock().await;
        let mut boards: Vec<BoardRef> = state
            .cycle
            .as_ref()
            .map(|cycle| cycle.in_flight.keys().cloned().collect())
            .unwrap_or_default();
        boards.sort();
        boards
    }
}

impl Inner {
    async fn fetch_and_complete(self: Arc<Self>, cycle: u64, board: BoardRef) {
        let fetch = AssertUnwindSafe(self.fetcher.fetch(&board)).catch_unwind();
        let result = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FetchError::Panicked {
                board: board.clone(),
            }),
            Err(_) => Err(FetchError::Timeout {
                board: board.clone(),
            }),
        };
        self.complete(cycle, &board, result).await;
    }

    /// Record one fetch completion and finalize the cycle on the last one.
    async fn complete(
        &self,
        cycle_id: u64,
        board: &BoardRef,
        result: Result<CatalogSnapshot, FetchError>,
    ) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(cycle) = state.cycle.as_mut().filter(|cycle| cycle.id == cycle_id) else {
            debug!(cycle = cycle_id, board = %board, "Completion for a finished cycle, ignoring");
            return;
        };
        cycle.in_flight.remove(board);

        match result {
            Ok(snapshot) => {
                let matched = collect_matches(&cycle.filters, &snapshot.posts, state.ledger.set());
                let pins_created = self.request_pins(&snapshot.board, &matched).await;

                cycle.report.posts_seen += snapshot.posts.len();
                cycle.report.pins_requested += matched.len();
                cycle.report.pins_created += pins_created;

                state
                    .ledger
                    .set_mut()
                    .add_all(matched.iter().map(|post| post.no));
                cycle
                    .observed
                    .extend(snapshot.posts.iter().map(|post| post.no));

                debug!(
                    cycle = cycle_id,
                    board = %board,
                    posts = snapshot.posts.len(),
                    matched = matched.len(),
                    "Board checked"
                );
            }
            Err(e) => {
                // Posts of a failed board are not observed, so their ignore
                // entries are pruned at finalize.
                warn!(cycle = cycle_id, board = %board, "Catalog fetch failed: {e}");
                cycle.report.failed_boards.push(board.clone());
            }
        }

        cycle.outstanding = cycle.outstanding.saturating_sub(1);
        if cycle.outstanding == 0 {
            self.finalize(state).await;
        }
    }

    async fn finalize(&self, state: &mut State) {
        let Some(cycle) = state.cycle.take() else {
            return;
        };
        let PollCycle {
            id,
            observed,
            mut report,
            done,
            keep_alive,
            ..
        } = cycle;

        state.ledger.set_mut().retain_all(&observed);
        if let Err(e) = state.ledger.persist().await {
            warn!(cycle = id, "{e:#}");
        }
        drop(observed);

        self.polling.store(false, Ordering::Release);
        drop(keep_alive);

        report.finished_at = Utc::now();
        report.ignored = state.ledger.set().len();
        info!(
            cycle = id,
            boards = report.boards.len(),
            failed = report.failed_boards.len(),
            posts = report.posts_seen,
            pins_created = report.pins_created,
            ignored = report.ignored,
            "Filter watch cycle finished"
        );
        // The ticket may have been dropped.
        let _ = done.send(report);
    }

    /// Ask the pin sink to watch the thread of each matched post. Returns the
    /// number of new pins.
    async fn request_pins(&self, board: &BoardRef, posts: &[&PostSnapshot]) -> usize {
        let mut created = 0;
        for post in posts {
            let request = PinRequest {
                thread: post.thread(board),
                post_no: post.no,
                subject: post.subject.clone(),
                pin_type: PinType::WatchNewPosts,
            };
            let pinned = AssertUnwindSafe(self.pins.create_pin_if_absent(&request))
                .catch_unwind()
                .await;
            match pinned {
                Ok(Ok(true)) => {
                    created += 1;
                    info!(
                        thread = %request.thread,
                        post = post.no,
                        "Pinned thread from watch filter"
                    );
                }
                Ok(Ok(false)) => debug!(thread = %request.thread, "Thread already pinned"),
                Ok(Err(e)) => warn!(thread = %request.thread, "Failed to create pin: {e:#}"),
                Err(_) => error!(thread = %request.thread, "Pin sink panicked"),
            }
        }
        created
    }
}

/// Posts that matched an enabled watch filter, opted into filter watching,
/// and are not ignored yet. Each post appears once, in filter-then-post order.
fn collect_matches<'a>(
    filters: &[FilterRule],
    posts: &'a [PostSnapshot],
    ignored: &IgnoreSet,
) -> Vec<&'a PostSnapshot> {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();
    for rule in filters {
        for post in posts {
            if FilterEngine::matches(rule, post)
                && post.filter_watch
                && !ignored.contains(post.no)
                && seen.insert(post.no)
            {
                matched.push(post);
            }
        }
    }
    matched
}
