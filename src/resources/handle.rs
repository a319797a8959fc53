use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::mpsc::Sender;

pub(crate) enum RefOp {
    AddRef(Arc<str>, u64),
    RemoveRef(Arc<str>, u64),
}

/// A counted reference to a resource entry. An entry with live handles is never purged.
///
/// Clones and drops only send a message, the scheduler applies them on its next tick. A handle
/// issued before its entry was purged or cleared doesn't count for a later entry of the same path.
pub struct ResourceHandle {
    path: Arc<str>,
    generation: u64,
    ops: Sender<RefOp>,
}

impl ResourceHandle {
    pub(crate) fn new(path: Arc<str>, generation: u64, ops: Sender<RefOp>) -> Self {
        // The scheduler may be gone already, then there's nothing left to count.
        let _ = ops.send(RefOp::AddRef(path.clone(), generation));
        Self { path, generation, ops }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Clone for ResourceHandle {
    fn clone(&self) -> Self {
        ResourceHandle::new(self.path.clone(), self.generation, self.ops.clone())
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        let _ = self.ops.send(RefOp::RemoveRef(self.path.clone(), self.generation));
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.generation == other.generation
    }
}

impl Eq for ResourceHandle {}

impl Debug for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ResourceHandle").field(&self.path).finish()
    }
}
