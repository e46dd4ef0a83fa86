//! Purpose: Consumer handle over a resolver; registration and chaining helpers.
//! Exports: `Promise`.
//! Role: Thin pass-through; every helper is a composition of `then`.
//! Invariants: Each registration yields a new promise; the receiver is never mutated.
//! Invariants: Promises are then-ables and are assimilated like any foreign handle.

use crate::api::deferred::Deferred;
use crate::core::consequence::Reactions;
use crate::core::resolver::{Resolver, ResolverState};
use crate::core::thenable::{Resolvable, ResolverId, Settle, Thenable};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

pub struct Promise<V: Resolvable> {
    resolver: Resolver<V>,
}

impl<V: Resolvable> Promise<V> {
    pub(crate) fn from_resolver(resolver: Resolver<V>) -> Self {
        Self { resolver }
    }

    /// Promise for `value`; then-ables are assimilated, anything else fulfills.
    pub fn when(value: V) -> Self {
        let deferred = Deferred::new();
        deferred.resolve(value);
        deferred.promise()
    }

    pub fn resolved(value: V) -> Self {
        Self::when(value)
    }

    pub fn rejected(reason: V) -> Self {
        let deferred = Deferred::new();
        deferred.reject(reason);
        deferred.promise()
    }

    pub fn id(&self) -> ResolverId {
        self.resolver.id()
    }

    pub fn state(&self) -> ResolverState<V> {
        self.resolver.state()
    }

    pub fn then(&self, reactions: Reactions<V>) -> Promise<V> {
        Promise::from_resolver(self.resolver.then(reactions))
    }

    pub fn and_then(&self, on_fulfilled: impl FnOnce(V) -> Result<V, V> + 'static) -> Promise<V> {
        self.then(Reactions::new().on_fulfilled(on_fulfilled))
    }

    pub fn otherwise(&self, on_rejected: impl FnOnce(V) -> Result<V, V> + 'static) -> Promise<V> {
        self.then(Reactions::new().on_rejected(on_rejected))
    }

    pub fn progress(&self, on_progress: impl Fn(V) -> V + 'static) -> Promise<V> {
        self.then(Reactions::new().on_progress(on_progress))
    }

    /// Runs `callback` on either outcome; the outcome itself passes through.
    pub fn always(&self, callback: impl FnOnce() + 'static) -> Promise<V> {
        let callback = Rc::new(Cell::new(Some(callback)));
        let on_reject = Rc::clone(&callback);
        self.then(
            Reactions::new()
                .on_fulfilled(move |value| {
                    if let Some(callback) = callback.take() {
                        callback();
                    }
                    Ok(value)
                })
                .on_rejected(move |reason| {
                    if let Some(callback) = on_reject.take() {
                        callback();
                    }
                    Err(reason)
                }),
        )
    }
}

impl<V: Resolvable> Thenable<V> for Promise<V> {
    fn then(&self, on_fulfilled: Settle<V>, on_rejected: Settle<V>) -> Result<(), V> {
        self.resolver.then(
            Reactions::new()
                .on_fulfilled(move |value: V| {
                    on_fulfilled(value.clone());
                    Ok(value)
                })
                .on_rejected(move |reason: V| {
                    on_rejected(reason.clone());
                    Err(reason)
                }),
        );
        Ok(())
    }

    fn resolver_id(&self) -> Option<ResolverId> {
        Some(self.resolver.id())
    }
}

impl<V: Resolvable> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
        }
    }
}

/// Promises are equal when they observe the same resolver.
impl<V: Resolvable> PartialEq for Promise<V> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<V: Resolvable> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("state", &self.state().label())
            .finish()
    }
}
