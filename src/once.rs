use crate::{
    id::RequestId,
    promise::Promise,
    request,
    types::Outcome,
    worker::{spawn_worker, Worker},
};
use core::{any::Any, fmt};
use parking_lot::Mutex;
use std::sync::Arc;

/// Runs a function at most once across all callers, delivering the same
/// outcome to every caller.
///
/// Similar in principle to [`std::sync::Once`], but built from the
/// worker/request primitives of this crate so that an execution which ends
/// up depending on its own result is detected and failed with
/// [`SelfDependencyError`](crate::error::SelfDependencyError) instead of
/// deadlocking.
pub struct Once<T> {
    state: Mutex<Option<OnceState<T>>>,
}

struct OnceState<T> {
    promise: Promise<T>,
    request_id: RequestId,
}

impl<T> Once<T> {
    /// A `Once` that has not run anything yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// The identifier of the internal request that represents the
    /// completion of all [`Once::call`] invocations on this instance, or
    /// `None` if nothing has called it yet.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.state
            .lock()
            .as_ref()
            .map(|state| state.request_id.clone())
    }
}

impl<T: Any + Clone + Default + Send + Sync> Once<T> {
    /// Calls `f` if and only if `call` is being invoked for the first time
    /// on this instance, and returns the outcome of that single execution
    /// to this and every other caller.
    ///
    /// `for_worker` is the worker the result is requested on behalf of. `f`
    /// itself runs on its own freshly spawned worker that is responsible
    /// for providing the return value. If `f` directly or indirectly causes
    /// another `call` on the same instance, all affected calls fail with
    /// [`SelfDependencyError`](crate::error::SelfDependencyError); `f` is
    /// never invoked a second time.
    pub fn call<F>(&self, for_worker: &Worker, f: F) -> Outcome<T>
    where
        F: FnOnce(&Worker) -> Outcome<T> + Send + 'static,
    {
        let promise = {
            let mut state = self.state.lock();
            match &*state {
                Some(existing) => existing.promise.clone(),
                None => {
                    // First call: establish the inner request and start
                    // executing the function on its own worker.
                    let (resolver, promise) = request::open::<T>(for_worker);
                    *state = Some(OnceState {
                        promise: promise.clone(),
                        request_id: resolver.request_id(),
                    });
                    let reporter = resolver.clone();
                    spawn_worker(&[&resolver], move |worker| {
                        let (value, error) = f(&worker);
                        reporter.report(&worker, value, error);
                    });
                    promise
                }
            }
        };
        promise.wait(for_worker)
    }
}

impl<T> Default for Once<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Once<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let started = self.state.lock().is_some();
        f.debug_struct("Once").field("started", &started).finish()
    }
}

/// Returns a function that runs `f` on a newly created worker the first
/// time it is called; that and all subsequent calls return whatever that
/// single execution produced.
///
/// A convenience over [`Once`] for situations where the underlying
/// [`RequestId`] is unimportant and a plain callable is easier to pass
/// around. The returned closure is cheap to clone, and clones share the
/// single execution.
pub fn once_func<T, F>(f: F) -> impl Fn(&Worker) -> Outcome<T> + Clone + Send + Sync + 'static
where
    T: Any + Clone + Default + Send + Sync,
    F: FnOnce(&Worker) -> Outcome<T> + Send + 'static,
{
    let once = Arc::new(Once::new());
    let f = Arc::new(Mutex::new(Some(f)));
    move |requesting_worker: &Worker| {
        let f = Arc::clone(&f);
        once.call(requesting_worker, move |worker| {
            let f = f.lock().take().expect("once function already ran");
            f(worker)
        })
    }
}
