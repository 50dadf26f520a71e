use crate::id::RequestId;
use thiserror::Error;

/// Returned from [`Promise::wait`](crate::promise::Promise::wait) when a
/// direct or indirect self-dependency is created in the worker-and-request
/// graph by this or some other concurrent wait.
///
/// All waits blocking on any request in the detected dependency cycle fail
/// with this error at the same time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("self-dependency detected")]
pub struct SelfDependencyError {
    /// Identifiers of the requests included in the dependency cycle, in
    /// unspecified order.
    ///
    /// Callers may use these together with their own records of what each
    /// request means to build a higher-level error describing the set of
    /// operations that together caused the problem.
    pub request_ids: Vec<RequestId>,
}

/// Returned from [`Promise::wait`](crate::promise::Promise::wait) when the
/// [`Worker`](crate::worker::Worker) responsible for resolving the request
/// was dropped before the request was resolved.
///
/// This suggests a bug in the responsible worker: it must either resolve or
/// delegate every request it is responsible for before its handle goes out
/// of scope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("responsible worker was dropped before request was resolved")]
pub struct UnresolvedError {
    /// The request that was left unresolved. This is always the id of the
    /// request whose promise `wait` was called on.
    pub request_id: RequestId,
}
