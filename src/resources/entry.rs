use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::resources::{Payload, ResourceError};

pub type ResolvedCallback = Box<dyn FnOnce(&Payload) + Send>;
pub type RejectedCallback = Box<dyn FnOnce(&Arc<ResourceError>) + Send>;

/// `Requested → Loaded → Prepared`, or `Errored` from any of them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Requested,
    Loaded,
    Prepared,
    Errored,
}

struct Callbacks {
    on_resolved: Option<ResolvedCallback>,
    on_rejected: Option<RejectedCallback>,
}

/// Lifecycle record of one resource path.
pub struct ResourceEntry {
    path: String,
    state: ResourceState,
    payload: Option<Payload>,
    error: Option<Arc<ResourceError>>,
    callbacks: Vec<Callbacks>,
    last_active_frame: u64,
    pub(crate) ref_count: usize,
    /// Handles count towards an entry only when they were issued for the same generation.
    pub(crate) generation: u64,
}

impl ResourceEntry {
    /// `path` has to be normalized already.
    pub(crate) fn new(path: String, frame: u64) -> Self {
        Self {
            path,
            state: ResourceState::Requested,
            payload: None,
            error: None,
            callbacks: Vec::new(),
            last_active_frame: frame,
            ref_count: 0,
            generation: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Prepared or errored. Settled entries don't change anymore.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, ResourceState::Prepared | ResourceState::Errored)
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.payload.clone()?.downcast::<T>().ok()
    }

    pub fn error(&self) -> Option<&Arc<ResourceError>> {
        self.error.as_ref()
    }

    pub fn last_active_frame(&self) -> u64 {
        self.last_active_frame
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub(crate) fn touch(&mut self, frame: u64) {
        self.last_active_frame = self.last_active_frame.max(frame);
    }

    /// Callbacks of a settled entry run right away.
    pub(crate) fn register_callbacks(
        &mut self,
        on_resolved: Option<ResolvedCallback>,
        on_rejected: Option<RejectedCallback>,
    ) {
        if on_resolved.is_none() && on_rejected.is_none() {
            return;
        }

        let callbacks = Callbacks {
            on_resolved,
            on_rejected,
        };

        match (&self.payload, &self.error) {
            (Some(payload), _) if self.state == ResourceState::Prepared => {
                if let Some(on_resolved) = callbacks.on_resolved {
                    on_resolved(payload);
                }
            }
            (_, Some(error)) => {
                if let Some(on_rejected) = callbacks.on_rejected {
                    on_rejected(error);
                }
            }
            _ => self.callbacks.push(callbacks),
        }
    }

    pub(crate) fn mark_loaded(&mut self) {
        if self.state == ResourceState::Requested {
            self.state = ResourceState::Loaded;
        }
    }

    pub(crate) fn prepare(&mut self, payload: Payload, frame: u64) {
        self.state = ResourceState::Prepared;
        self.error = None;
        self.touch(frame);

        for callbacks in self.callbacks.drain(..) {
            if let Some(on_resolved) = callbacks.on_resolved {
                on_resolved(&payload);
            }
        }
        self.payload = Some(payload);
    }

    pub(crate) fn fail(&mut self, error: Arc<ResourceError>) {
        self.state = ResourceState::Errored;
        self.payload = None;
        self.reject_pending(&error);
        self.error = Some(error);
    }

    /// Rejects everyone still waiting without changing the state, e.g. when the entry is removed.
    pub(crate) fn reject_pending(&mut self, error: &Arc<ResourceError>) {
        for callbacks in self.callbacks.drain(..) {
            if let Some(on_rejected) = callbacks.on_rejected {
                on_rejected(error);
            }
        }
    }
}

impl Debug for ResourceEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("error", &self.error)
            .field("callbacks", &self.callbacks.len())
            .field("last_active_frame", &self.last_active_frame)
            .field("ref_count", &self.ref_count)
            .finish()
    }
}
