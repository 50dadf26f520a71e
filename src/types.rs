use crate::graph::RequestNode;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::{
    error::Error,
    sync::{Arc, Weak},
};

/// A reference-counted error value.
///
/// A single resolution can be observed by any number of waiters, so errors
/// attached to it are shared rather than owned. Use
/// [`Error::downcast_ref`](std::error::Error::downcast_ref) to recover a
/// concrete error type such as
/// [`SelfDependencyError`](crate::error::SelfDependencyError).
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// The `(value, error)` pair reported by a resolver and observed by every
/// waiter of the same request.
///
/// Unlike `Result`, both sides may be populated at once: a producer can
/// report a partial value together with the error that explains why it is
/// partial.
pub type Outcome<T> = (T, Option<SharedError>);

/// Requests a worker is currently responsible for, keyed by node address.
///
/// Entries are weak so that the worker does not keep resolved requests
/// alive; insertion order is preserved so that forced failures on worker
/// drop happen in request-creation order.
pub(crate) type ResponsibilityMap = IndexMap<usize, Weak<RequestNode>, FxBuildHasher>;
