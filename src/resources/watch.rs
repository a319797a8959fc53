use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use lodestar_files::graph::types::ObjectGraph;
use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::resources::ResourceHandle;
use crate::resources::clock::Clock;
use crate::resources::store::ResourceStore;

/// Anything that depends on a set of resource paths.
pub trait Watchable {
    fn resource_paths(&self) -> Vec<String>;
}

impl Watchable for ObjectGraph {
    fn resource_paths(&self) -> Vec<String> {
        self.paths().to_vec()
    }
}

impl<S: AsRef<str>> Watchable for [S] {
    fn resource_paths(&self) -> Vec<String> {
        self.iter().map(|path| path.as_ref().to_string()).collect()
    }
}

impl Watchable for ResourceHandle {
    fn resource_paths(&self) -> Vec<String> {
        vec![self.path().to_string()]
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Every watched path is prepared or errored.
    Completed,
    Unwatched,
    TimedOut,
}

/// Receives `(settled, total)` whenever the number of settled paths changes.
pub type ProgressCallback = Box<dyn FnMut(usize, usize) + Send>;

struct Watch {
    id: WatchId,
    paths: Vec<String>,
    started: f64,
    settled: usize,
    on_progress: Option<ProgressCallback>,
    sender: oneshot::Sender<WatchOutcome>,
    /// Keeps the watched entries alive until the watch finishes.
    _handles: Vec<ResourceHandle>,
}

impl Watch {
    fn finish(self, outcome: WatchOutcome) {
        debug!("Watch {:?} finished: {:?}", self.id, outcome);
        // Nobody listening is fine.
        let _ = self.sender.send(outcome);
    }
}

/// Resolves once the watch is finished, either by polling it as a future or with
/// [`CompletionSignal::try_outcome`].
pub struct CompletionSignal {
    id: WatchId,
    receiver: oneshot::Receiver<WatchOutcome>,
    outcome: Option<WatchOutcome>,
}

impl CompletionSignal {
    pub fn id(&self) -> WatchId {
        self.id
    }

    pub fn try_outcome(&mut self) -> Option<WatchOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.receiver.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(WatchOutcome::Unwatched),
            };
        }
        self.outcome
    }
}

impl Future for CompletionSignal {
    type Output = WatchOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.outcome {
            return Poll::Ready(outcome);
        }

        Pin::new(&mut this.receiver).poll(cx).map(|result| {
            let outcome = result.unwrap_or(WatchOutcome::Unwatched);
            this.outcome = Some(outcome);
            outcome
        })
    }
}

/// Watches are checked round robin, a bounded number per update.
#[derive(Default)]
pub struct WatchRegistry {
    watches: VecDeque<Watch>,
    next_id: u64,
}

impl WatchRegistry {
    pub(crate) fn add(
        &mut self,
        paths: Vec<String>,
        handles: Vec<ResourceHandle>,
        on_progress: Option<ProgressCallback>,
        now: f64,
    ) -> CompletionSignal {
        let id = WatchId(self.next_id);
        self.next_id += 1;

        let (sender, receiver) = oneshot::channel();
        self.watches.push_back(Watch {
            id,
            paths,
            started: now,
            settled: 0,
            on_progress,
            sender,
            _handles: handles,
        });

        CompletionSignal {
            id,
            receiver,
            outcome: None,
        }
    }

    pub fn unwatch(&mut self, id: WatchId) -> bool {
        let Some(position) = self.watches.iter().position(|watch| watch.id == id) else {
            return false;
        };

        if let Some(watch) = self.watches.remove(position) {
            watch.finish(WatchOutcome::Unwatched);
        }
        true
    }

    /// Finishes every watch over exactly `paths`. Returns how many there were.
    pub fn unwatch_paths(&mut self, paths: &[String]) -> usize {
        let (matching, remaining): (VecDeque<_>, VecDeque<_>) =
            self.watches.drain(..).partition(|watch| watch.paths == paths);
        self.watches = remaining;

        let count = matching.len();
        for watch in matching {
            watch.finish(WatchOutcome::Unwatched);
        }
        count
    }

    pub fn purge_all(&mut self) {
        for watch in self.watches.drain(..) {
            watch.finish(WatchOutcome::Unwatched);
        }
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.watches
            .iter()
            .any(|watch| watch.paths.iter().any(|watched| watched == path))
    }

    pub(crate) fn watched_paths(&self) -> HashSet<String> {
        self.watches
            .iter()
            .flat_map(|watch| watch.paths.iter().cloned())
            .collect()
    }

    /// Checks up to `max_count` watches (all of them for 0) until `max_update_time` seconds are
    /// used up. Paths that were cleared from the store count as settled.
    pub(crate) fn update(
        &mut self,
        store: &ResourceStore,
        clock: &dyn Clock,
        max_update_time: f64,
        max_count: usize,
        max_time: f64,
    ) {
        let start = clock.now();
        let count = match max_count {
            0 => self.watches.len(),
            limit => limit.min(self.watches.len()),
        };

        for _ in 0..count {
            let Some(mut watch) = self.watches.pop_front() else {
                break;
            };

            let total = watch.paths.len();
            let settled = watch
                .paths
                .iter()
                .filter(|path| store.find(path).is_none_or(|entry| entry.is_settled()))
                .count();

            if settled != watch.settled {
                watch.settled = settled;
                if let Some(on_progress) = watch.on_progress.as_mut() {
                    on_progress(settled, total);
                }
            }

            let now = clock.now();
            if settled == total {
                watch.finish(WatchOutcome::Completed);
            } else if now - watch.started > max_time {
                warn!(
                    "Watch {:?} timed out with {} of {} resources settled",
                    watch.id, settled, total
                );
                watch.finish(WatchOutcome::TimedOut);
            } else {
                self.watches.push_back(watch);
            }

            if now - start >= max_update_time {
                break;
            }
        }
    }
}
