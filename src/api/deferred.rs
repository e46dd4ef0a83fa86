//! Purpose: Producer handle that settles or reports progress on a resolver.
//! Exports: `Deferred`.
//! Role: Thin pass-through to `Resolver`; owns the matching consumer `Promise`.
//! Invariants: `resolve`/`reject` are idempotent after the first completion.

use crate::api::promise::Promise;
use crate::core::resolver::Resolver;
use crate::core::thenable::Resolvable;
use std::fmt;

pub struct Deferred<V: Resolvable> {
    resolver: Resolver<V>,
    promise: Promise<V>,
}

impl<V: Resolvable> Deferred<V> {
    pub fn new() -> Self {
        let resolver = Resolver::new();
        let promise = Promise::from_resolver(resolver.clone());
        Self { resolver, promise }
    }

    pub fn promise(&self) -> Promise<V> {
        self.promise.clone()
    }

    pub fn resolve(&self, value: V) {
        self.resolver.resolve(value);
    }

    pub fn reject(&self, reason: V) {
        self.resolver.reject(reason);
    }

    pub fn notify_progress(&self, progress: V) {
        self.resolver.update(progress);
    }
}

impl<V: Resolvable> Default for Deferred<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Resolvable> Clone for Deferred<V> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            promise: self.promise.clone(),
        }
    }
}

impl<V: Resolvable> fmt::Debug for Deferred<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("resolver", &self.resolver)
            .finish()
    }
}
