//! Low-level utilities for coordinating a number of workers that are all
//! collaborating to produce different parts of some overall result, with
//! dynamically discovered dependencies between those workers.
//!
//! Workers and requests form a bipartite graph. Every request has exactly
//! one worker responsible for resolving it, and every worker is waiting for
//! zero or one requests to be resolved. If worker A waits for a result that
//! will be produced by worker B, while B is (directly or transitively)
//! waiting for a result A is responsible for, every request in that chain
//! immediately fails with a [`SelfDependencyError`](error::SelfDependencyError)
//! instead of deadlocking. A worker whose handle is dropped while it still
//! owes results fails them with an
//! [`UnresolvedError`](error::UnresolvedError) so that waiters are
//! eventually released rather than blocked forever.
//!
//! This crate:
//! - Detects dependency cycles at wait time with a lock-free walk over the
//!   graph edges, so requests never need to declare their dependencies up
//!   front.
//! - Delivers each request's `(value, error)` outcome exactly once to any
//!   number of waiting workers.
//! - Transfers responsibility for requests between workers atomically when
//!   new workers are constructed.
//!
//! Key modules:
//! - `worker`: the [`Worker`](worker::Worker) handle, delegation at
//!   construction time, and the [`spawn_worker`](worker::spawn_worker)
//!   thread convenience.
//! - `request`: the [`open`](request::open) constructor and the producer
//!   side ([`Resolver`](request::Resolver)).
//! - `promise`: the consumer side ([`Promise`](promise::Promise)).
//! - `once`: [`Once`](once::Once) and [`once_func`](once::once_func),
//!   at-most-once execution with self-dependency detection.
//!
//! Quick start:
//! 1. Create a [`Worker`](worker::Worker) for the current codepath.
//! 2. Open requests under it with [`request::open`], handing each
//!    [`Resolver`](request::Resolver) to a worker spawned via
//!    [`spawn_worker`](worker::spawn_worker).
//! 3. Wait for results with [`Promise::wait`](promise::Promise::wait) and
//!    discriminate forced failures by downcasting the returned
//!    [`SharedError`](types::SharedError).
//!
//! This is a nuts-and-bolts abstraction intended as an implementation
//! detail of a higher-level system, not as a cross-cutting concern in
//! another library's exported API. Prefer ordinary blocking calls or
//! channels to represent relationships between concurrent work in larger
//! scopes.

/// Error types reported to waiters released by force-failed requests.
///
/// Both carry [`RequestId`](id::RequestId)s so callers can map the failure
/// back to a higher-level description of the affected operations.
pub mod error;
mod graph;
/// Weak pointer-identity of requests.
///
/// Provides [`RequestId`](id::RequestId), comparable even after the
/// underlying request has been reclaimed.
pub mod id;
/// At-most-once execution built on the worker/request primitives.
///
/// Provides [`Once`](once::Once) and the [`once_func`](once::once_func)
/// convenience wrapper.
pub mod once;
/// The consumer side of a request.
///
/// Provides [`Promise`](promise::Promise), through which any number of
/// workers wait for a resolution.
pub mod promise;
/// Request construction and the producer side.
///
/// Provides [`open`](request::open), [`Resolver`](request::Resolver), the
/// type-erased [`AnyResolver`](request::AnyResolver), and the
/// [`ResolverContainer`](request::ResolverContainer) aggregation
/// capability used for bulk delegation.
pub mod request;
/// Common aliases used across the crate (shared errors, outcomes).
pub mod types;
/// Worker handles and worker-backed thread spawning.
pub mod worker;
