use crate::graph::RequestNode;
use core::{
    fmt,
    hash::{Hash, Hasher},
};
use std::sync::Weak;

/// An opaque but comparable unique identifier for a request, whose resolver
/// may or may not still be live.
///
/// `RequestId` values appear in the errors this crate reports for
/// situations that would otherwise deadlock. Callers can maintain a lookup
/// table from `RequestId` to some higher-level description of each request
/// to include more relevant context in externally-facing errors; the id
/// implements `Hash` and `Eq` so it can act as its own map key.
///
/// Identity is the address of the underlying request node, held weakly:
/// two ids compare equal exactly when they were produced by the same
/// request, and the comparison keeps working after the request itself has
/// been dropped.
#[derive(Clone)]
pub struct RequestId {
    node: Weak<RequestNode>,
}

impl RequestId {
    pub(crate) fn new(node: Weak<RequestNode>) -> Self {
        Self { node }
    }

    fn addr(&self) -> usize {
        self.node.as_ptr() as usize
    }
}

impl PartialEq for RequestId {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for RequestId {}

impl Hash for RequestId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for RequestId {
    /// Human-oriented, for log and debug output only; the address is not a
    /// stable key across process runs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({:#x})", self.addr())
    }
}
