use std::any::{Any, type_name};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::task::noop_waker_ref;
use itertools::Itertools;
use log::{debug, error, info, trace};
use tokio::sync::oneshot;

use crate::io::{FetchFuture, FetchedData, Fetcher, ResponseKind};
use crate::resources::clock::Clock;
use crate::resources::entry::{RejectedCallback, ResolvedCallback};
use crate::resources::handle::RefOp;
use crate::resources::loaders::LoaderRegistry;
use crate::resources::paths::{PrefixTable, normalize_path};
use crate::resources::store::ResourceStore;
use crate::resources::watch::{CompletionSignal, ProgressCallback, WatchId, WatchRegistry, Watchable};
use crate::resources::{Payload, ResourceEntry, ResourceError, ResourceHandle, ResourceState};
use crate::settings::SchedulerSettings;

/// Called with every entry right before it is purged or cleared.
pub type PurgeCallback = Box<dyn FnMut(&ResourceEntry) + Send>;

/// Seconds of accumulated frame time per purge cadence frame.
const CADENCE_FRAME_TIME: f64 = 1.0;
/// Cadence frames between two automatic purges.
const AUTO_PURGE_INTERVAL: u32 = 5;
/// Ticks without any fetch or decode work before the scheduler reports idle.
const IDLE_TICKS: u32 = 2;

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<Result<Payload, Arc<ResourceError>>>>>>;

fn send_once(slot: &ResultSlot, result: Result<Payload, Arc<ResourceError>>) {
    if let Some(sender) = slot.lock().expect("Result slot lock").take() {
        // The future may have been dropped already.
        let _ = sender.send(result);
    }
}

struct PendingLoad {
    path: String,
    url: String,
    kind: ResponseKind,
    future: FetchFuture,
}

struct DecodeJob {
    path: String,
    data: FetchedData,
}

/// Resolves with the payload of a resource once the scheduler prepared it. Holds a
/// [`ResourceHandle`] until then, so the entry can't be purged.
pub struct ResourceFuture {
    handle: ResourceHandle,
    receiver: oneshot::Receiver<Result<Payload, Arc<ResourceError>>>,
}

impl ResourceFuture {
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }
}

impl Future for ResourceFuture {
    type Output = Result<Payload, Arc<ResourceError>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(Arc::new(ResourceError::Purged {
                    path: this.handle.path().to_string(),
                }))
            })
        })
    }
}

/// Drives every resource from request to prepared payload.
///
/// Nothing happens in the background: fetches are polled and decoded payloads are prepared
/// from [`ResourceScheduler::tick`], which also runs watches and the purge cadence.
pub struct ResourceScheduler {
    settings: SchedulerSettings,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    loaders: LoaderRegistry,
    prefixes: PrefixTable,
    store: ResourceStore,
    watches: WatchRegistry,
    pending_loads: Vec<PendingLoad>,
    prepare_queue: VecDeque<DecodeJob>,
    ref_sender: Sender<RefOp>,
    ref_receiver: Receiver<RefOp>,
    next_generation: u64,
    on_purge: Option<PurgeCallback>,
    no_load_frames: u32,
    active_frame: u64,
    purge_frame: u32,
    purge_time: f64,
    last_tick: Option<f64>,
}

impl ResourceScheduler {
    pub fn new(
        settings: SchedulerSettings,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        loaders: LoaderRegistry,
    ) -> Self {
        let (ref_sender, ref_receiver) = channel();
        Self {
            settings,
            fetcher,
            clock,
            loaders,
            prefixes: PrefixTable::default(),
            store: ResourceStore::default(),
            watches: WatchRegistry::default(),
            pending_loads: Vec::new(),
            prepare_queue: VecDeque::new(),
            ref_sender,
            ref_receiver,
            next_generation: 0,
            on_purge: None,
            no_load_frames: IDLE_TICKS,
            active_frame: 0,
            purge_frame: 0,
            purge_time: 0.0,
            last_tick: None,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SchedulerSettings {
        &mut self.settings
    }

    pub fn loaders_mut(&mut self) -> &mut LoaderRegistry {
        &mut self.loaders
    }

    /// `register_prefix("res", "https://cdn.example/res")` serves `res:/a/b.black` from
    /// `https://cdn.example/res/a/b.black`.
    pub fn register_prefix(&mut self, prefix: &str, base: impl Into<String>) {
        let base = base.into();
        debug!("Registered prefix {}:/ at \"{}\"", prefix, base);
        self.prefixes.register(prefix, base);
    }

    pub fn set_purge_callback(&mut self, on_purge: impl FnMut(&ResourceEntry) + Send + 'static) {
        self.on_purge = Some(Box::new(on_purge));
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn entry(&self, path: &str) -> Option<&ResourceEntry> {
        self.store.find(path)
    }

    pub fn state(&self, path: &str) -> Option<ResourceState> {
        self.entry(path).map(ResourceEntry::state)
    }

    pub fn active_frame(&self) -> u64 {
        self.active_frame
    }

    pub fn pending_count(&self) -> usize {
        self.pending_loads.len()
    }

    pub fn queued_count(&self) -> usize {
        self.prepare_queue.len()
    }

    /// True until two ticks in a row had neither pending fetches nor queued decodes.
    pub fn is_loading(&self) -> bool {
        self.no_load_frames < IDLE_TICKS
    }

    /// Requests `path` and registers callbacks for its outcome. Concurrent requests of a path
    /// share one fetch; settled entries (errored ones included) answer right away.
    pub fn request_resource<R, E>(&mut self, path: &str, on_resolved: R, on_rejected: E) -> ResourceHandle
    where
        R: FnOnce(&Payload) + Send + 'static,
        E: FnOnce(&Arc<ResourceError>) + Send + 'static,
    {
        self.request_with(path, Some(Box::new(on_resolved)), Some(Box::new(on_rejected)))
    }

    pub fn request(&mut self, path: &str) -> ResourceHandle {
        self.request_with(path, None, None)
    }

    pub fn fetch_resource(&mut self, path: &str) -> ResourceFuture {
        let (sender, receiver) = oneshot::channel();
        let resolved: ResultSlot = Arc::new(Mutex::new(Some(sender)));
        let rejected = resolved.clone();

        let handle = self.request_with(
            path,
            Some(Box::new(move |payload: &Payload| send_once(&resolved, Ok(payload.clone())))),
            Some(Box::new(move |error: &Arc<ResourceError>| {
                send_once(&rejected, Err(error.clone()))
            })),
        );

        ResourceFuture { handle, receiver }
    }

    /// Like [`Self::fetch_resource`], with the payload downcast to `T`.
    pub fn fetch_object<T: Any + Send + Sync>(
        &mut self,
        path: &str,
    ) -> BoxFuture<'static, Result<Arc<T>, Arc<ResourceError>>> {
        let path = normalize_path(path);
        self.fetch_resource(&path)
            .map(move |result| -> Result<Arc<T>, Arc<ResourceError>> {
                result?.downcast::<T>().map_err(|_| {
                    Arc::new(ResourceError::UnexpectedPayload {
                        path,
                        expected: type_name::<T>(),
                    })
                })
            })
            .boxed()
    }

    /// The prepared payload behind `handle`. Counts as activity for the purge.
    pub fn get<T: Any + Send + Sync>(&mut self, handle: &ResourceHandle) -> Option<Arc<T>> {
        let frame = self.active_frame;
        let entry = self.store.find_mut(handle.path())?;
        entry.touch(frame);
        entry.payload_as::<T>()
    }

    fn request_with(
        &mut self,
        path: &str,
        on_resolved: Option<ResolvedCallback>,
        on_rejected: Option<RejectedCallback>,
    ) -> ResourceHandle {
        let path = normalize_path(path);
        let frame = self.active_frame;

        if let Some(entry) = self.store.find_mut(&path) {
            trace!("{} is already known ({:?})", path, entry.state());
            let handle = ResourceHandle::new(Arc::from(path.as_str()), entry.generation, self.ref_sender.clone());
            entry.touch(frame);
            entry.register_callbacks(on_resolved, on_rejected);
            return handle;
        }

        let mut entry = ResourceEntry::new(path.clone(), frame);
        entry.generation = self.next_generation;
        self.next_generation += 1;
        let handle = ResourceHandle::new(Arc::from(path.as_str()), entry.generation, self.ref_sender.clone());
        entry.register_callbacks(on_resolved, on_rejected);

        let load = match self.begin_load(&path) {
            Ok(load) => Some(load),
            Err(err) => {
                error!("Failed to request {}: {}", path, err);
                entry.fail(Arc::new(err));
                None
            }
        };

        if let Err(err) = self.store.add(entry) {
            error!("{}", err);
            return handle;
        }

        if let Some(load) = load {
            info!("Requested {}", path);
            self.no_load_frames = 0;
            self.pending_loads.push(load);
            self.poll_pending_loads();
        }

        handle
    }

    fn begin_load(&self, path: &str) -> Result<PendingLoad, ResourceError> {
        if path.starts_with("dynamic:/") {
            return Err(ResourceError::Unsupported {
                feature: "Dynamic resources",
                path: path.to_string(),
            });
        }
        if path.starts_with("manual:/") {
            return Err(ResourceError::Unsupported {
                feature: "Manually created resources",
                path: path.to_string(),
            });
        }

        let loader = self
            .loaders
            .find(path)
            .ok_or_else(|| ResourceError::UnknownExtension { path: path.to_string() })?;
        let url = self.prefixes.resolve(path)?;
        let future = self.fetcher.fetch(&url);

        Ok(PendingLoad {
            path: path.to_string(),
            url,
            kind: loader.response_kind(),
            future,
        })
    }

    /// Polls every in-flight fetch once. Finished ones move into the prepare queue in the order
    /// they were requested.
    fn poll_pending_loads(&mut self) {
        let mut cx = Context::from_waker(noop_waker_ref());

        let mut index = 0;
        while index < self.pending_loads.len() {
            let Poll::Ready(result) = self.pending_loads[index].future.poll_unpin(&mut cx) else {
                index += 1;
                continue;
            };

            let load = self.pending_loads.remove(index);
            let data = result.and_then(|response| FetchedData::from_response(&load.url, response, load.kind));

            let Some(entry) = self.store.find_mut(&load.path) else {
                continue;
            };

            match data {
                Ok(data) => {
                    entry.mark_loaded();
                    info!("Loaded {}", load.path);
                    self.prepare_queue.push_back(DecodeJob { path: load.path, data });
                }
                Err(err) => {
                    error!("Failed to load {}: {}", load.path, err);
                    entry.fail(Arc::new(err.into()));
                }
            }
        }
    }

    /// Decodes one job. Returns false when it failed.
    fn prepare(&mut self, job: DecodeJob) -> bool {
        let result = match self.loaders.find(&job.path) {
            Some(loader) => {
                profiling::scope!("prepare", job.path.as_str());
                loader
                    .decode(&job.path, job.data)
                    .map_err(|source| ResourceError::Decode {
                        path: job.path.clone(),
                        source,
                    })
            }
            None => Err(ResourceError::UnknownExtension { path: job.path.clone() }),
        };

        let frame = self.active_frame;
        let Some(entry) = self.store.find_mut(&job.path) else {
            return result.is_ok();
        };

        match result {
            Ok(payload) => {
                entry.prepare(payload, frame);
                debug!("Prepared {}", job.path);
                true
            }
            Err(err) => {
                error!("{}", err);
                entry.fail(Arc::new(err));
                false
            }
        }
    }

    fn drain_ref_ops(&mut self) {
        let frame = self.active_frame;
        while let Ok(op) = self.ref_receiver.try_recv() {
            match op {
                RefOp::AddRef(path, generation) => {
                    if let Some(entry) = self.store.find_mut(&path).filter(|entry| entry.generation == generation) {
                        entry.ref_count += 1;
                    }
                }
                RefOp::RemoveRef(path, generation) => {
                    if let Some(entry) = self.store.find_mut(&path).filter(|entry| entry.generation == generation) {
                        entry.ref_count = entry.ref_count.saturating_sub(1);
                        entry.touch(frame);
                    }
                }
            }
        }
    }

    /// One frame of work: fetch polling, budgeted decoding, watches and the purge cadence.
    pub fn tick(&mut self) {
        profiling::scope!("ResourceScheduler::tick");

        let now = self.clock.now();
        let dt = self.last_tick.map_or(0.0, |last| (now - last).max(0.0));
        self.last_tick = Some(now);

        self.drain_ref_ops();
        self.poll_pending_loads();

        if self.pending_loads.is_empty() && self.prepare_queue.is_empty() {
            self.no_load_frames = (self.no_load_frames + 1).min(IDLE_TICKS);
        } else {
            self.no_load_frames = 0;
        }

        // The first job always runs, even with an exhausted budget.
        let start = self.clock.now();
        let mut budget = self.settings.max_prepare_time;
        while let Some(job) = self.prepare_queue.pop_front() {
            if !self.prepare(job) {
                budget = 0.0;
            }

            if self.clock.now() - start >= budget {
                break;
            }
        }

        self.watches.update(
            &self.store,
            self.clock.as_ref(),
            self.settings.max_watched_update_time,
            self.settings.max_watched_count,
            self.settings.max_watched_time,
        );

        self.purge_time += dt;
        if self.purge_time > CADENCE_FRAME_TIME {
            self.active_frame += 1;
            self.purge_time -= self.purge_time.floor();
            self.purge_frame += 1;

            if self.purge_frame >= AUTO_PURGE_INTERVAL {
                self.purge_frame = 0;
                if self.settings.auto_purge {
                    self.purge_inactive();
                }
            }
        }
    }

    /// Evicts settled, unreferenced and unwatched entries that were not used for
    /// `purge_time` cadence frames. Returns the purged paths.
    pub fn purge_inactive(&mut self) -> Vec<String> {
        self.drain_ref_ops();

        let watched = self.watches.watched_paths();
        let on_purge = &mut self.on_purge;
        self.store.purge_inactive(
            self.active_frame,
            self.settings.purge_frame_limit,
            self.settings.purge_time,
            |entry| watched.contains(entry.path()),
            |entry| {
                if let Some(on_purge) = on_purge.as_mut() {
                    on_purge(entry);
                }
            },
        )
    }

    /// Forgets every resource, in-flight fetches and queued decodes included. Pending callbacks
    /// are rejected.
    pub fn clear(&mut self) {
        info!("Clearing {} resources", self.store.len());
        self.pending_loads.clear();
        self.prepare_queue.clear();

        let on_purge = &mut self.on_purge;
        self.store.clear(|entry| {
            if let Some(on_purge) = on_purge.as_mut() {
                on_purge(entry);
            }
        });
    }

    /// Resolves once every path `object` depends on is settled. Missing paths are requested.
    pub fn watch(&mut self, object: &(impl Watchable + ?Sized)) -> CompletionSignal {
        self.watch_paths(object.resource_paths(), None)
    }

    pub fn watch_with_progress(
        &mut self,
        object: &(impl Watchable + ?Sized),
        on_progress: impl FnMut(usize, usize) + Send + 'static,
    ) -> CompletionSignal {
        self.watch_paths(object.resource_paths(), Some(Box::new(on_progress)))
    }

    /// Requests every path that isn't known yet, the watch holds a handle of each.
    fn watch_paths(&mut self, paths: Vec<String>, on_progress: Option<ProgressCallback>) -> CompletionSignal {
        let paths = paths.iter().map(|path| normalize_path(path)).collect_vec();
        let handles = paths.iter().map(|path| self.request(path)).collect_vec();
        self.watches.add(paths, handles, on_progress, self.clock.now())
    }

    pub fn unwatch(&mut self, id: WatchId) -> bool {
        self.watches.unwatch(id)
    }

    /// Releases everyone waiting on a watch of `object`.
    pub fn unwatch_object(&mut self, object: &(impl Watchable + ?Sized)) -> usize {
        let paths = object.resource_paths().iter().map(|path| normalize_path(path)).collect_vec();
        self.watches.unwatch_paths(&paths)
    }

    pub fn purge_watched(&mut self) {
        self.watches.purge_all();
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.watches.is_watched(&normalize_path(path))
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }
}
