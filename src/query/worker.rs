use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use tracing::debug;

use super::{Query, SearchOptions, Searcher};
use crate::error::Error;
use crate::snapshot::Snapshot;

/// Queue depth of both channels
const QUEUE_LEN: usize = 100;
/// How often a worker stuck on a full response queue checks for shutdown
const STOP_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub enum SearchMessage {
    Search(SearchRequest),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub id: u64,
    pub snapshot: Snapshot,
    pub pattern: String,
    pub options: SearchOptions,
    /// `None` finds every match; `Some(offset)` finds the nearest one from
    /// there in `options.direction`.
    pub from: Option<usize>,
    pub cancel: Arc<AtomicBool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResponse {
    /// Chars scanned so far out of `total`
    Progress { id: u64, scanned: usize, total: usize },
    Matches { id: u64, matches: Vec<Range<usize>> },
    Cancelled { id: u64 },
    Error { id: u64, message: String },
}

impl SearchResponse {
    pub fn id(&self) -> u64 {
        match self {
            SearchResponse::Progress { id, .. }
            | SearchResponse::Matches { id, .. }
            | SearchResponse::Cancelled { id }
            | SearchResponse::Error { id, .. } => *id,
        }
    }

    /// Whether no further responses follow for this request
    pub fn is_final(&self) -> bool {
        !matches!(self, SearchResponse::Progress { .. })
    }
}

/// Caller's side of one submitted search.
#[derive(Debug, Clone)]
pub struct SearchHandle {
    pub id: u64,
    cancel: Arc<AtomicBool>,
}

impl SearchHandle {
    /// Ask the worker to stop; it notices between blocks.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Background thread running searches against snapshots.
pub struct SearchWorker {
    cmd_tx: Sender<SearchMessage>,
    resp_rx: Receiver<SearchResponse>,
    handle: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    next_id: u64,
}

impl SearchWorker {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = bounded::<SearchMessage>(QUEUE_LEN);
        let (resp_tx, resp_rx) = bounded::<SearchResponse>(QUEUE_LEN);
        let stop = Arc::new(AtomicBool::new(false));

        let worker_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            Self::search_worker(cmd_rx, resp_tx, worker_stop);
        });

        Self {
            cmd_tx,
            resp_rx,
            handle: Some(handle),
            stop,
            next_id: 0,
        }
    }

    fn search_worker(cmd_rx: Receiver<SearchMessage>, resp_tx: Sender<SearchResponse>, stop: Arc<AtomicBool>) {
        while let Ok(SearchMessage::Search(request)) = cmd_rx.recv() {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let response = Self::run(&request, &resp_tx);
            match &response {
                SearchResponse::Matches { matches, .. } => {
                    debug!(id = request.id, matches = matches.len(), "search finished")
                }
                other => debug!(id = request.id, response = ?other, "search stopped"),
            }
            if !Self::deliver(&resp_tx, response, &stop) {
                break;
            }
        }
        debug!("search worker stopped");
    }

    /// Blocking send that gives up once `stop` is raised, so an owner that
    /// never reads responses can still shut the worker down.
    fn deliver(resp_tx: &Sender<SearchResponse>, mut response: SearchResponse, stop: &AtomicBool) -> bool {
        loop {
            match resp_tx.send_timeout(response, STOP_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) if !stop.load(Ordering::Relaxed) => response = back,
                Err(_) => return false,
            }
        }
    }

    fn run(request: &SearchRequest, resp_tx: &Sender<SearchResponse>) -> SearchResponse {
        let id = request.id;
        let snapshot = &request.snapshot;
        let query = match Query::new(&request.pattern, &request.options) {
            Ok(query) => query,
            Err(err) => {
                return SearchResponse::Error {
                    id,
                    message: err.to_string(),
                }
            }
        };
        let searcher = Searcher::new(&snapshot.table, &snapshot.lines, &query, snapshot.search_block_lines())
            .with_cancel(&request.cancel);

        let total = snapshot.len();
        let result = match request.from {
            Some(from) => searcher
                .find(from, request.options.direction, request.options.wrap)
                .map(|found| found.into_iter().collect()),
            None => searcher.find_all_with(|scanned| {
                // Progress is best effort; a full channel drops it
                let _ = resp_tx.try_send(SearchResponse::Progress { id, scanned, total });
            }),
        };

        match result {
            Ok(matches) => SearchResponse::Matches { id, matches },
            Err(Error::Cancelled) => SearchResponse::Cancelled { id },
            Err(err) => SearchResponse::Error {
                id,
                message: err.to_string(),
            },
        }
    }

    /// Queue a search with a fresh cancellation flag.
    pub fn search(
        &mut self,
        snapshot: Snapshot,
        pattern: &str,
        options: SearchOptions,
        from: Option<usize>,
    ) -> Result<SearchHandle, String> {
        self.search_with_cancel(snapshot, pattern, options, from, Arc::new(AtomicBool::new(false)))
    }

    /// Queue a search observing a caller-owned flag, so one flag can stop a
    /// whole series of requests. Never blocks: a full queue is an error.
    pub fn search_with_cancel(
        &mut self,
        snapshot: Snapshot,
        pattern: &str,
        options: SearchOptions,
        from: Option<usize>,
        cancel: Arc<AtomicBool>,
    ) -> Result<SearchHandle, String> {
        self.next_id += 1;
        let id = self.next_id;
        let request = SearchRequest {
            id,
            snapshot,
            pattern: pattern.to_string(),
            options,
            from,
            cancel: Arc::clone(&cancel),
        };
        match self.cmd_tx.try_send(SearchMessage::Search(request)) {
            Ok(()) => Ok(SearchHandle { id, cancel }),
            Err(TrySendError::Full(_)) => Err("Search queue is full".to_string()),
            Err(TrySendError::Disconnected(_)) => Err("Search worker has stopped".to_string()),
        }
    }

    pub fn try_recv_response(&self) -> Option<SearchResponse> {
        self.resp_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<SearchResponse> {
        self.resp_rx.recv_timeout(timeout).ok()
    }

    /// Block until the final response of `id`, skipping everything else.
    pub fn wait_for(&self, id: u64, timeout: Duration) -> Option<SearchResponse> {
        while let Some(response) = self.recv_timeout(timeout) {
            if response.id() == id && response.is_final() {
                return Some(response);
            }
        }
        None
    }

    /// Stop the worker and wait for it. Unread responses are discarded.
    pub fn shutdown(mut self) {
        self.signal_stop();
        while self.resp_rx.try_recv().is_ok() {}
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn signal_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        // Wakes a worker idle in `recv`; a full queue means it is not idle
        let _ = self.cmd_tx.try_send(SearchMessage::Shutdown);
    }
}

impl Default for SearchWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
