//! The internal worker/request graph shared by all public handles.
//!
//! Every request is backed by a [`RequestNode`] and every worker by a
//! [`WorkerNode`]. The two node types form a bipartite graph with two kinds
//! of directed edges, both stored as atomically swappable `Arc` cells so
//! that the self-dependency detector can traverse them without taking any
//! lock:
//!
//! - `RequestNode::responsible` points at the single worker currently
//!   expected to resolve the request. Never absent; changes over time as
//!   responsibility is delegated between workers.
//! - `WorkerNode::awaiting` points at the request the worker is currently
//!   blocked on, if any. Each worker awaits at most one request at a time.
//!
//! The payload type of a request is erased at this layer: the node stores
//! the value as `Box<dyn Any>` so that resolvers of different result types
//! can be delegated in aggregate. The typed wrappers in
//! [`request`](crate::request) and [`promise`](crate::promise) restore the
//! compile-time type at the boundary.

use crate::{
    error::{SelfDependencyError, UnresolvedError},
    id::RequestId,
    types::{Outcome, ResponsibilityMap, SharedError},
};
use arc_swap::{ArcSwap, ArcSwapOption};
use core::{any::Any, fmt, ptr};
use derive_more::Debug;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// The resolution slot of a request, installed at most once.
///
/// The two variants keep a legitimately default-valued explicit payload
/// distinguishable from a forced failure.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// The responsible worker reported this outcome through its resolver.
    Explicit {
        #[debug(skip)]
        value: Box<dyn Any + Send + Sync>,
        error: Option<SharedError>,
    },
    /// The library forced an errored resolution to release waiters after
    /// incorrect use: a dependency cycle or a dropped responsible worker.
    UsageFault(SharedError),
}

impl Resolution {
    fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit { .. })
    }

    /// Recovers the compile-time payload type chosen by the typed handles.
    ///
    /// A usage fault stores no payload, so it yields `T::default()` next to
    /// the fault's error. An explicit resolution always downcasts: the only
    /// writer is `Resolver<T>`, which boxes a `T`.
    pub(crate) fn typed<T: Any + Clone + Default>(&self) -> Outcome<T> {
        match self {
            Self::Explicit { value, error } => {
                let value = value
                    .downcast_ref::<T>()
                    .expect("request resolved with a value of unexpected type")
                    .clone();
                (value, error.clone())
            }
            Self::UsageFault(error) => (T::default(), Some(Arc::clone(error))),
        }
    }
}

/// Shared state of one request, referenced by its resolver, its promises,
/// and (weakly) by the responsibility map of its current worker.
pub(crate) struct RequestNode {
    /// The worker currently expected to resolve this request. Readable
    /// without locks so the self-dependency walk stays lock-free.
    responsible: ArcSwap<WorkerNode>,
    /// One-shot slot. `None` until resolved; loads are lock-free, all
    /// stores happen with `lock` held and are followed by a broadcast.
    resolution: ArcSwapOption<Resolution>,
    lock: Mutex<()>,
    resolved: Condvar,
}

impl RequestNode {
    /// Opens a request with the given worker initially responsible for it.
    pub(crate) fn new(responsible: Arc<WorkerNode>) -> Arc<Self> {
        let node = Arc::new(Self {
            responsible: ArcSwap::new(Arc::clone(&responsible)),
            resolution: ArcSwapOption::new(None),
            lock: Mutex::new(()),
            resolved: Condvar::new(),
        });
        responsible.adopt(&node);
        node
    }

    pub(crate) fn id(self: &Arc<Self>) -> RequestId {
        RequestId::new(Arc::downgrade(self))
    }

    /// Re-points responsibility for this request at `new_worker`.
    ///
    /// No cycle check is needed here: delegation only happens while the new
    /// worker is being constructed, and a worker that is not yet awaiting
    /// anything cannot be part of a waiting chain.
    pub(crate) fn delegate_to(self: &Arc<Self>, new_worker: &Arc<WorkerNode>) {
        self.responsible.store(Arc::clone(new_worker));
        new_worker.adopt(self);
    }

    /// Installs an explicit resolution on behalf of `resolving_worker`.
    ///
    /// # Panics
    /// If `resolving_worker` is not the worker currently responsible for
    /// this request, or if the request already has an explicit resolution.
    /// Both are bugs in the caller.
    pub(crate) fn resolve_explicit(
        &self,
        resolving_worker: &Arc<WorkerNode>,
        value: Box<dyn Any + Send + Sync>,
        error: Option<SharedError>,
    ) {
        let _held = self.lock.lock();
        let responsible = self.responsible.load();
        if !Arc::ptr_eq(&responsible, resolving_worker) {
            panic!(
                "request was resolved by worker {:p}, but {:p} was responsible",
                Arc::as_ptr(resolving_worker),
                Arc::as_ptr(&responsible),
            );
        }
        if let Some(existing) = self.resolution.load_full() {
            if existing.is_explicit() {
                panic!("request resolved multiple times");
            }
            // A usage fault is already installed and may have been observed
            // by other waiters; the late explicit outcome is dropped so the
            // reported outcome never changes.
            return;
        }
        self.resolution
            .store(Some(Arc::new(Resolution::Explicit { value, error })));
        self.resolved.notify_all();
    }

    /// Installs a forced failure unless the request is already resolved.
    ///
    /// Idempotent: once any resolution is in place the existing one is kept,
    /// since waiters might already have observed it.
    pub(crate) fn resolve_usage_fault(&self, error: SharedError) {
        let _held = self.lock.lock();
        if self.resolution.load().is_some() {
            return;
        }
        self.resolution
            .store(Some(Arc::new(Resolution::UsageFault(error))));
        self.resolved.notify_all();
    }

    /// Blocks `requesting` until this request is resolved, checking first
    /// that the wait cannot deadlock.
    ///
    /// # Panics
    /// If `requesting` is already awaiting some request. Each worker can
    /// await only one promise at a time, so this is always a bug in the
    /// caller.
    pub(crate) fn await_resolution(
        self: &Arc<Self>,
        requesting: &Arc<WorkerNode>,
    ) -> Arc<Resolution> {
        if requesting.awaiting.load().is_some() {
            panic!(
                "worker {:p} awaits multiple promises",
                Arc::as_ptr(requesting)
            );
        }
        if let Some(resolution) = self.resolution.load_full() {
            // Already resolved; return as quickly as possible.
            return resolution;
        }
        self.await_slow(requesting)
    }

    /// The slow-path wait. Nothing has been locked so far, so everything
    /// the fast path observed must be rechecked against concurrent actors.
    ///
    /// The overall approach follows the ownership-based promise deadlock
    /// detector of Voss and Sarkar (arXiv:2101.01312): publish the edge
    /// being added to the graph, walk the chain it creates using atomic
    /// reads only, and block only once the walk proves the chain does not
    /// lead back to the requesting worker.
    fn await_slow(self: &Arc<Self>, requesting: &Arc<WorkerNode>) -> Arc<Resolution> {
        let claimed = requesting
            .awaiting
            .compare_and_swap(ptr::null::<RequestNode>(), Some(Arc::clone(self)));
        if claimed.is_some() {
            // Another thread started waiting with this worker since the
            // fast-path check.
            panic!(
                "worker {:p} awaits multiple promises",
                Arc::as_ptr(requesting)
            );
        }
        // Whatever exit is taken below, `awaiting` must be released again so
        // the worker can wait on other promises later.
        let _unclaim = AwaitClaim {
            worker: requesting,
            request: self,
        };

        let (cycle, _) = detect_self_dependency(self, requesting, false);
        if cycle {
            // Rerun the walk in collecting mode to report which requests are
            // affected. The redundancy keeps the happy path allocation-free.
            // A concurrent responsibility transfer can make the second walk
            // come out slightly different, but it still covers at least some
            // of the requests trapped in the cycle.
            let (_, affected) = detect_self_dependency(self, requesting, true);
            let request_ids: Vec<RequestId> = affected.iter().map(RequestNode::id).collect();
            tracing::debug!(
                affected = request_ids.len(),
                "self-dependency detected; failing every request in the cycle"
            );
            let error: SharedError = Arc::new(SelfDependencyError { request_ids });
            for request in &affected {
                request.resolve_usage_fault(Arc::clone(&error));
            }
            // `self` is always among the collected requests, so the loop
            // below observes the fault and returns without blocking.
        }

        let mut held = self.lock.lock();
        loop {
            if let Some(resolution) = self.resolution.load_full() {
                return resolution;
            }
            // The mutex is released while parked and reacquired on wakeup.
            self.resolved.wait(&mut held);
        }
    }
}

impl fmt::Debug for RequestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestNode({:p})", self as *const Self)
    }
}

/// Clears `worker.awaiting` on every exit path of the slow wait, including
/// unwinding.
struct AwaitClaim<'a> {
    worker: &'a Arc<WorkerNode>,
    request: &'a Arc<RequestNode>,
}

impl Drop for AwaitClaim<'_> {
    fn drop(&mut self) {
        let previous = self
            .worker
            .awaiting
            .compare_and_swap(Arc::as_ptr(self.request), None);
        let swapped_back = matches!(&*previous, Some(req) if Arc::ptr_eq(req, self.request));
        if !swapped_back {
            // Some other thread mutated the claim while this worker was the
            // one waiting, so the worker is being used from two places at
            // once.
            panic!(
                "worker {:p} awaits multiple promises",
                Arc::as_ptr(self.worker)
            );
        }
    }
}

/// Walks the waiting chain that starts at `start` and reports whether it
/// leads back to `requesting`.
///
/// Each step follows two edges: from the current request to its responsible
/// worker, then from that worker to the request it is awaiting. Every
/// worker awaits at most one request and every request has exactly one
/// responsible worker, so the walk is linear in the number of currently
/// blocked workers. Only atomic pointer reads are involved.
///
/// The walk ends without a cycle when the chain reaches a worker that is
/// not awaiting anything, or when the freshness check notices that
/// responsibility for the current request moved while we were between hops.
/// A stale edge proves nothing, and the racing delegation or resolution
/// will unblock this chain on its own.
///
/// When `collect` is set, every request visited (including `start`) is
/// accumulated for error reporting.
fn detect_self_dependency(
    start: &Arc<RequestNode>,
    requesting: &Arc<WorkerNode>,
    collect: bool,
) -> (bool, Vec<Arc<RequestNode>>) {
    let mut visited = Vec::new();
    let mut current_request = Arc::clone(start);
    let mut current_worker = current_request.responsible.load_full();
    if collect {
        visited.push(Arc::clone(&current_request));
    }
    while !Arc::ptr_eq(&current_worker, requesting) {
        let Some(next_request) = current_worker.awaiting.load_full() else {
            break;
        };
        if !Arc::ptr_eq(&current_request.responsible.load(), &current_worker) {
            break;
        }
        current_request = next_request;
        current_worker = current_request.responsible.load_full();
        if collect {
            visited.push(Arc::clone(&current_request));
        }
    }
    (Arc::ptr_eq(&current_worker, requesting), visited)
}

/// Shared state of one worker, referenced by its external handle and by
/// every request currently listing it as responsible.
pub(crate) struct WorkerNode {
    /// The request this worker is currently blocked on, if any. Readable
    /// without locks so the self-dependency walk stays lock-free.
    awaiting: ArcSwapOption<RequestNode>,
    /// Requests this worker still owes. Consulted only when the external
    /// handle is dropped; entries are never removed eagerly, so the sweep
    /// skips entries that died or were delegated away in the meantime.
    responsible_for: Mutex<ResponsibilityMap>,
}

impl WorkerNode {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            awaiting: ArcSwapOption::new(None),
            responsible_for: Mutex::new(ResponsibilityMap::default()),
        })
    }

    /// Records that this worker owes `request`.
    fn adopt(&self, request: &Arc<RequestNode>) {
        let mut owed = self.responsible_for.lock();
        owed.insert(Arc::as_ptr(request) as usize, Arc::downgrade(request));
    }

    /// Force-fails every request this worker still owes.
    ///
    /// Called exactly once, when the external handle is dropped. The
    /// still-owed set is snapshotted under the worker's mutex first and the
    /// requests are faulted outside of it, so no request mutex is ever
    /// acquired while the worker mutex is held.
    pub(crate) fn handle_dropped(&self) {
        let owed: Vec<Arc<RequestNode>> = {
            let mut responsible_for = self.responsible_for.lock();
            responsible_for
                .drain(..)
                .filter_map(|(_, weak)| weak.upgrade())
                .filter(|request| ptr::eq(Arc::as_ptr(&request.responsible.load()), self))
                .collect()
        };
        if owed.is_empty() {
            return;
        }
        tracing::debug!(
            worker = ?(self as *const Self),
            abandoned = owed.len(),
            "worker handle dropped before resolving its requests; force-failing them"
        );
        for request in owed {
            let error: SharedError = Arc::new(UnresolvedError {
                request_id: request.id(),
            });
            request.resolve_usage_fault(error);
        }
    }
}

impl fmt::Debug for WorkerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerNode({:p})", self as *const Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit(value: u32) -> Box<dyn Any + Send + Sync> {
        Box::new(value)
    }

    fn fault() -> SharedError {
        Arc::new(std::io::Error::other("forced failure"))
    }

    #[test]
    fn usage_fault_after_explicit_is_a_noop() {
        let worker = WorkerNode::new();
        let request = RequestNode::new(Arc::clone(&worker));
        request.resolve_explicit(&worker, explicit(7), None);
        request.resolve_usage_fault(fault());

        let resolution = request.resolution.load_full().expect("resolved");
        let (value, error) = resolution.typed::<u32>();
        assert_eq!(value, 7);
        assert!(error.is_none());
    }

    #[test]
    fn explicit_after_usage_fault_is_dropped() {
        let worker = WorkerNode::new();
        let request = RequestNode::new(Arc::clone(&worker));
        request.resolve_usage_fault(fault());
        request.resolve_explicit(&worker, explicit(7), None);

        let resolution = request.resolution.load_full().expect("resolved");
        let (value, error) = resolution.typed::<u32>();
        assert_eq!(value, u32::default());
        assert!(error.is_some());
    }

    #[test]
    #[should_panic(expected = "request resolved multiple times")]
    fn double_explicit_resolution_panics() {
        let worker = WorkerNode::new();
        let request = RequestNode::new(Arc::clone(&worker));
        request.resolve_explicit(&worker, explicit(1), None);
        request.resolve_explicit(&worker, explicit(2), None);
    }

    #[test]
    #[should_panic(expected = "was responsible")]
    fn resolution_by_the_wrong_worker_panics() {
        let responsible = WorkerNode::new();
        let interloper = WorkerNode::new();
        let request = RequestNode::new(responsible);
        request.resolve_explicit(&interloper, explicit(1), None);
    }

    #[test]
    fn delegation_repoints_responsibility() {
        let first = WorkerNode::new();
        let second = WorkerNode::new();
        let request = RequestNode::new(Arc::clone(&first));
        request.delegate_to(&second);
        request.resolve_explicit(&second, explicit(9), None);

        let (value, error) = request.resolution.load_full().unwrap().typed::<u32>();
        assert_eq!(value, 9);
        assert!(error.is_none());
    }

    #[test]
    fn dropped_worker_faults_only_requests_it_still_owes() {
        let first = WorkerNode::new();
        let second = WorkerNode::new();
        let kept = RequestNode::new(Arc::clone(&first));
        let delegated = RequestNode::new(Arc::clone(&first));
        delegated.delegate_to(&second);

        first.handle_dropped();

        let (_, error) = kept.resolution.load_full().unwrap().typed::<u32>();
        let error = error.expect("kept request must be faulted");
        let unresolved = error
            .downcast_ref::<UnresolvedError>()
            .expect("fault must be an UnresolvedError");
        assert_eq!(unresolved.request_id, kept.id());
        assert!(delegated.resolution.load().is_none());
    }
}
