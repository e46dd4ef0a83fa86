//! Purpose: Define the capability check that decides whether a value is an async handle.
//! Exports: `Resolvable`, `Thenable`, `ThenFn`, `Settle`, `ResolverId`.
//! Role: The only reflection-like boundary of the engine; everything else is nominal.
//! Invariants: Detection is an explicit trait query applied to every success value.
//! Invariants: Identity for self-resolution comes from `ResolverId`, never from equality.

use crate::core::error::Error;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOLVER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResolverId(u64);

impl ResolverId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RESOLVER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// One-shot settlement callback handed to a then-able during assimilation.
///
/// Then-ables may call it any number of times; the engine guards against
/// anything after the first call of either callback in the pair.
pub type Settle<V> = Box<dyn Fn(V)>;

/// Payload carried by a resolver, as success value, failure reason and progress.
pub trait Resolvable: Clone + 'static {
    /// Returns the registration capability when this value is an async handle.
    fn as_thenable(&self) -> Option<Rc<dyn Thenable<Self>>>;

    /// Converts an engine-raised error into a rejection reason.
    fn from_error(error: Error) -> Self;
}

/// Registration capability with the two-callback (success, failure) shape.
pub trait Thenable<V> {
    /// Registers the pair of callbacks. `Err` stands for a synchronous throw.
    fn then(&self, on_fulfilled: Settle<V>, on_rejected: Settle<V>) -> Result<(), V>;

    /// Identity of the resolver behind this handle, if it is one of ours.
    fn resolver_id(&self) -> Option<ResolverId> {
        None
    }
}

/// Callable then-able: a closure that receives the settlement pair directly.
pub struct ThenFn<F>(pub F);

impl<V, F> Thenable<V> for ThenFn<F>
where
    F: Fn(Settle<V>, Settle<V>) -> Result<(), V>,
{
    fn then(&self, on_fulfilled: Settle<V>, on_rejected: Settle<V>) -> Result<(), V> {
        (self.0)(on_fulfilled, on_rejected)
    }
}
