use crate::{graph::WorkerNode, request::ResolverContainer};
use core::fmt;
use std::{sync::Arc, thread};

/// A specific linear codepath that will ultimately resolve zero or more
/// requests.
///
/// What exactly "linear codepath" means is up to the caller. The simplest
/// mental model is one worker per thread, dropped when the thread finishes,
/// with no other thread touching it. The only hard constraint is that a
/// worker waits on at most one promise at a time, so two threads may share
/// a worker as long as they arrange for at most one of them to use it at
/// any instant.
///
/// The handle must be kept alive until the worker has either resolved or
/// delegated every request it is responsible for. Dropping it earlier fails
/// all of those requests with
/// [`UnresolvedError`](crate::error::UnresolvedError), which unblocks any
/// workers that would otherwise wait forever; rely on that as a backstop,
/// not as a happy-path mechanism.
#[must_use]
pub struct Worker {
    // The externally held handle is separated from the node that
    // participates in the graph: requests keep the node alive, while the
    // cleanup contract is bound to this handle alone.
    pub(crate) inner: Arc<WorkerNode>,
}

impl Worker {
    /// Allocates a new worker, transferring responsibility for every
    /// request yielded by `delegated` to it.
    ///
    /// Callers are responsible for only delegating requests that the
    /// calling codepath was itself responsible for. There is no immediate
    /// check (the relationship between codepaths and workers is the
    /// caller's concern), but incorrect use is detected later when the
    /// previous worker attempts to resolve the request.
    pub fn new(delegated: &[&dyn ResolverContainer]) -> Self {
        let inner = WorkerNode::new();
        // Transferring responsibility needs no self-dependency check here:
        // the new worker is not awaiting anything yet, so it cannot be part
        // of any waiting chain.
        for container in delegated {
            container.visit_resolvers(&mut |resolver| {
                resolver.node.delegate_to(&inner);
            });
        }
        Self { inner }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.inner.handle_dropped();
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker({:p})", Arc::as_ptr(&self.inner))
    }
}

/// Runs `body` with a newly allocated [`Worker`] on a dedicated thread,
/// transferring responsibility for every request yielded by `delegated` to
/// the new worker first.
///
/// The handle is relinquished when `body` returns (or unwinds), so any
/// request the worker still owes at that point fails with
/// [`UnresolvedError`](crate::error::UnresolvedError) rather than leaving
/// its waiters blocked. The thread is dedicated because workers may block
/// indefinitely in [`Promise::wait`](crate::promise::Promise::wait).
pub fn spawn_worker<F>(delegated: &[&dyn ResolverContainer], body: F)
where
    F: FnOnce(Worker) + Send + 'static,
{
    let worker = Worker::new(delegated);
    thread::spawn(move || body(worker));
}
