use crate::{
    graph::RequestNode,
    id::RequestId,
    promise::Promise,
    types::SharedError,
    worker::Worker,
};
use core::{any::Any, fmt, marker::PhantomData};
use std::{error::Error, sync::Arc};

/// Opens a new request and returns both its resolver and its promise.
///
/// The given worker is initially responsible for resolving the request; it
/// can hand that responsibility to another worker by passing the resolver
/// to [`Worker::new`](crate::worker::Worker::new) or
/// [`spawn_worker`](crate::worker::spawn_worker).
#[must_use]
pub fn open<T>(responsible_worker: &Worker) -> (Resolver<T>, Promise<T>) {
    let node = RequestNode::new(Arc::clone(&responsible_worker.inner));
    let resolver = Resolver {
        node: Arc::clone(&node),
        _result: PhantomData,
    };
    (resolver, Promise::from_node(node))
}

/// The producer end of a request, used by the responsible
/// [`Worker`](crate::worker::Worker) to report the result and thereby
/// unblock every worker waiting on the matching [`Promise`].
///
/// Cloning yields another handle to the same request; resolving it twice
/// still panics no matter which handle is used.
pub struct Resolver<T> {
    node: Arc<RequestNode>,
    _result: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Resolver<T> {
    /// Resolves the request with both a result value and an error; both are
    /// returned from every [`Promise::wait`] call on the associated request.
    ///
    /// # Panics
    /// If `resolving_worker` is not responsible for this request, or if the
    /// request was already explicitly resolved.
    pub fn report(&self, resolving_worker: &Worker, value: T, error: Option<SharedError>) {
        self.node
            .resolve_explicit(&resolving_worker.inner, Box::new(value), error);
    }

    /// Shorthand for [`Resolver::report`] with no error, suggesting a
    /// successful result.
    pub fn report_success(&self, resolving_worker: &Worker, value: T) {
        self.report(resolving_worker, value, None);
    }

    /// Shorthand for [`Resolver::report`] with a default value, suggesting
    /// an error result without any useful accompanying value.
    pub fn report_error<E>(&self, resolving_worker: &Worker, error: E)
    where
        T: Default,
        E: Error + Send + Sync + 'static,
    {
        self.report(resolving_worker, T::default(), Some(Arc::new(error)));
    }
}

impl<T> Resolver<T> {
    /// A unique identifier for the request this resolver belongs to.
    ///
    /// Comparable with the ids carried by the errors this crate reports in
    /// situations that would otherwise deadlock.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.node.id()
    }

    /// A type-erased handle to the same request.
    ///
    /// Useful when a resolver must appear in a delegation list while the
    /// typed handle itself is moved into the spawned closure that will
    /// eventually resolve it.
    #[must_use]
    pub fn to_any(&self) -> AnyResolver {
        AnyResolver {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolver({:p})", Arc::as_ptr(&self.node))
    }
}

/// A resolver with its result type erased.
///
/// Delegating responsibility does not depend on what value type each
/// request carries, so [`Worker::new`](crate::worker::Worker::new) accepts
/// resolvers in this form, produced by [`Resolver::to_any`] or by a
/// [`ResolverContainer`] implementation.
#[derive(Clone)]
pub struct AnyResolver {
    pub(crate) node: Arc<RequestNode>,
}

impl AnyResolver {
    /// A unique identifier for the request this resolver belongs to.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.node.id()
    }
}

impl fmt::Debug for AnyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyResolver({:p})", Arc::as_ptr(&self.node))
    }
}

/// Implemented by types that in some sense contain resolvers, allowing the
/// responsibility for all of them to be transferred in aggregate when
/// constructing a new [`Worker`](crate::worker::Worker).
///
/// [`Resolver`] and [`AnyResolver`] implement this for themselves, so
/// callers with no need for aggregation can pass individual resolvers
/// directly; slices and vectors of containers also qualify.
pub trait ResolverContainer {
    /// Calls `visit` once for each resolver held by this container.
    fn visit_resolvers(&self, visit: &mut dyn FnMut(AnyResolver));
}

impl<T> ResolverContainer for Resolver<T> {
    fn visit_resolvers(&self, visit: &mut dyn FnMut(AnyResolver)) {
        visit(self.to_any());
    }
}

impl ResolverContainer for AnyResolver {
    fn visit_resolvers(&self, visit: &mut dyn FnMut(AnyResolver)) {
        visit(self.clone());
    }
}

impl<C: ResolverContainer> ResolverContainer for [C] {
    fn visit_resolvers(&self, visit: &mut dyn FnMut(AnyResolver)) {
        for container in self {
            container.visit_resolvers(visit);
        }
    }
}

impl<C: ResolverContainer> ResolverContainer for Vec<C> {
    fn visit_resolvers(&self, visit: &mut dyn FnMut(AnyResolver)) {
        self.as_slice().visit_resolvers(visit);
    }
}
