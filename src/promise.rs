use crate::{graph::RequestNode, id::RequestId, types::Outcome, worker::Worker};
use core::{any::Any, fmt, marker::PhantomData};
use std::sync::Arc;

/// The consumer end of a request, through which any number of workers can
/// wait for the result to become available.
///
/// Cloning yields another handle to the same request; all of them observe
/// the same resolution.
pub struct Promise<T> {
    node: Arc<RequestNode>,
    _result: PhantomData<fn() -> T>,
}

impl<T> Promise<T> {
    pub(crate) fn from_node(node: Arc<RequestNode>) -> Self {
        Self {
            node,
            _result: PhantomData,
        }
    }

    /// A unique identifier for the request this promise belongs to.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.node.id()
    }
}

impl<T: Any + Clone + Default> Promise<T> {
    /// Blocks until the associated request has been resolved, or until a
    /// problem forces it to resolve with a usage error to avoid
    /// deadlocking.
    ///
    /// The blocked worker is published as awaiting this request, and the
    /// waiting chain that creates is checked for a cycle before actually
    /// parking. On a detected cycle every request in the chain fails with
    /// [`SelfDependencyError`](crate::error::SelfDependencyError); if the
    /// responsible worker is dropped first, the request fails with
    /// [`UnresolvedError`](crate::error::UnresolvedError). A forced failure
    /// yields `T::default()` next to the error.
    ///
    /// # Panics
    /// If `requesting_worker` is already awaiting another promise.
    pub fn wait(&self, requesting_worker: &Worker) -> Outcome<T> {
        self.node.await_resolution(&requesting_worker.inner).typed()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Promise({:p})", Arc::as_ptr(&self.node))
    }
}
