//! Purpose: Single-resolution engine driving fulfillment, rejection and progress fan-out.
//! Exports: `Resolver`, `ResolverState`, `CompletionAction`.
//! Role: Shared core behind the producer (`Deferred`) and consumer (`Promise`) handles.
//! Invariants: Completion happens at most once; kind and value never change afterwards.
//! Invariants: Links are triggered once each, in registration order; none are lost mid-drain.
//! Invariants: No `RefCell` borrow is held while user callbacks or then-ables run.
//! Invariants: Cascades run through `cascade::run`, so chain depth never grows the stack.

use crate::core::cascade;
use crate::core::consequence::{Consequence, Reactions};
use crate::core::error::{Error, ErrorKind};
use crate::core::thenable::{Resolvable, ResolverId, Settle, Thenable};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompletionAction {
    Fulfill,
    Reject,
}

impl CompletionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionAction::Fulfill => "fulfill",
            CompletionAction::Reject => "reject",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolverState<V> {
    Pending,
    Fulfilled(V),
    Rejected(V),
}

impl<V> ResolverState<V> {
    pub fn is_pending(&self) -> bool {
        matches!(self, ResolverState::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, ResolverState::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ResolverState::Rejected(_))
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Fulfillment value or rejection reason, once settled.
    pub fn value(&self) -> Option<&V> {
        match self {
            ResolverState::Pending => None,
            ResolverState::Fulfilled(value) | ResolverState::Rejected(value) => Some(value),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolverState::Pending => "pending",
            ResolverState::Fulfilled(_) => "fulfilled",
            ResolverState::Rejected(_) => "rejected",
        }
    }
}

struct Completion<V> {
    action: CompletionAction,
    value: V,
}

struct State<V: Resolvable> {
    completion: Option<Completion<V>>,
    consequences: Vec<Rc<Consequence<V>>>,
}

struct Shared<V: Resolvable> {
    id: ResolverId,
    state: RefCell<State<V>>,
}

// Pending chains are released iteratively; the derived drop would recurse once
// per link.
impl<V: Resolvable> Drop for Shared<V> {
    fn drop(&mut self) {
        let mut orphans = mem::take(&mut self.state.get_mut().consequences);
        while let Some(consequence) = orphans.pop() {
            let Ok(consequence) = Rc::try_unwrap(consequence) else {
                continue;
            };
            let Ok(mut shared) = Rc::try_unwrap(consequence.into_resolver().shared) else {
                continue;
            };
            orphans.append(&mut shared.state.get_mut().consequences);
        }
    }
}

pub struct Resolver<V: Resolvable> {
    shared: Rc<Shared<V>>,
}

impl<V: Resolvable> Resolver<V> {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                id: ResolverId::next(),
                state: RefCell::new(State {
                    completion: None,
                    consequences: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> ResolverId {
        self.shared.id
    }

    pub fn is_completed(&self) -> bool {
        self.shared.state.borrow().completion.is_some()
    }

    /// Number of links waiting for this resolver to complete.
    pub fn pending_count(&self) -> usize {
        self.shared.state.borrow().consequences.len()
    }

    pub fn state(&self) -> ResolverState<V> {
        match self.completion() {
            None => ResolverState::Pending,
            Some((CompletionAction::Fulfill, value)) => ResolverState::Fulfilled(value),
            Some((CompletionAction::Reject, value)) => ResolverState::Rejected(value),
        }
    }

    /// Registers reactions and returns the resolver for their eventual result.
    ///
    /// When this resolver has already completed the new link is triggered
    /// before returning; otherwise it is queued behind earlier registrations.
    pub fn then(&self, reactions: Reactions<V>) -> Resolver<V> {
        let consequence = Consequence::new(reactions);
        let resolver = consequence.resolver().clone();
        match self.completion() {
            Some((action, value)) => {
                tracing::trace!(
                    resolver = %self.id(),
                    child = %resolver.id(),
                    action = action.as_str(),
                    "late registration triggered immediately"
                );
                consequence.trigger(action, value);
            }
            None => {
                tracing::trace!(resolver = %self.id(), child = %resolver.id(), "link registered");
                self.shared
                    .state
                    .borrow_mut()
                    .consequences
                    .push(Rc::new(consequence));
            }
        }
        resolver
    }

    /// Fulfills with `value`, or assimilates it when it is a then-able.
    pub fn resolve(&self, value: V) {
        if self.is_completed() {
            return;
        }
        let Some(thenable) = value.as_thenable() else {
            self.complete(CompletionAction::Fulfill, value);
            return;
        };
        if thenable.resolver_id() == Some(self.id()) {
            tracing::debug!(resolver = %self.id(), "resolved with its own promise");
            self.reject(V::from_error(
                Error::new(ErrorKind::SelfResolution)
                    .with_message("a promise cannot be resolved with itself"),
            ));
            return;
        }
        self.assimilate(thenable.as_ref());
    }

    /// Rejects with `reason`. Rejection reasons are never assimilated.
    pub fn reject(&self, reason: V) {
        if self.is_completed() {
            return;
        }
        self.complete(CompletionAction::Reject, reason);
    }

    /// Forwards a progress value to every link registered so far.
    pub fn update(&self, progress: V) {
        let consequences = {
            let state = self.shared.state.borrow();
            if state.completion.is_some() {
                return;
            }
            state.consequences.clone()
        };
        tracing::trace!(resolver = %self.id(), links = consequences.len(), "progress");
        for consequence in consequences {
            let resolver = self.clone();
            let progress = progress.clone();
            cascade::run(Box::new(move || {
                // A progress reaction may settle this resolver; later links
                // then see the completion instead.
                if !resolver.is_completed() {
                    consequence.update(progress);
                }
            }));
        }
    }

    fn assimilate(&self, thenable: &dyn Thenable<V>) {
        let handled = Rc::new(Cell::new(false));
        let on_fulfilled: Settle<V> = {
            let handled = Rc::clone(&handled);
            let resolver = self.clone();
            Box::new(move |value| {
                if !handled.replace(true) {
                    resolver.resolve(value);
                }
            })
        };
        let on_rejected: Settle<V> = {
            let handled = Rc::clone(&handled);
            let resolver = self.clone();
            Box::new(move |reason| {
                if !handled.replace(true) {
                    resolver.reject(reason);
                }
            })
        };

        tracing::trace!(resolver = %self.id(), "assimilating then-able");
        if let Err(reason) = thenable.then(on_fulfilled, on_rejected) {
            if handled.replace(true) {
                tracing::debug!(
                    resolver = %self.id(),
                    "then-able threw after settling; error dropped"
                );
            } else {
                self.reject(reason);
            }
        }
    }

    fn complete(&self, action: CompletionAction, value: V) {
        let consequences = {
            let mut state = self.shared.state.borrow_mut();
            if state.completion.is_some() {
                return;
            }
            state.completion = Some(Completion {
                action,
                value: value.clone(),
            });
            mem::take(&mut state.consequences)
        };
        tracing::debug!(
            resolver = %self.id(),
            action = action.as_str(),
            links = consequences.len(),
            "resolver completed"
        );
        for consequence in consequences {
            let value = value.clone();
            cascade::run(Box::new(move || consequence.trigger(action, value)));
        }
    }

    fn completion(&self) -> Option<(CompletionAction, V)> {
        self.shared
            .state
            .borrow()
            .completion
            .as_ref()
            .map(|completion| (completion.action, completion.value.clone()))
    }
}

impl<V: Resolvable> Clone for Resolver<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<V: Resolvable> Default for Resolver<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Resolvable> fmt::Debug for Resolver<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        let label = match state.completion.as_ref().map(|completion| completion.action) {
            None => "pending",
            Some(CompletionAction::Fulfill) => "fulfilled",
            Some(CompletionAction::Reject) => "rejected",
        };
        f.debug_struct("Resolver")
            .field("id", &self.shared.id)
            .field("state", &label)
            .field("pending", &state.consequences.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::thenable::ThenFn;

    #[derive(Clone, Debug, PartialEq)]
    enum Item {
        Num(i64),
        Failure(ErrorKind),
        Later(Resolver<Item>),
    }

    impl PartialEq for Resolver<Item> {
        fn eq(&self, other: &Self) -> bool {
            self.id() == other.id()
        }
    }

    struct Handle(Resolver<Item>);

    impl Thenable<Item> for Handle {
        fn then(&self, on_fulfilled: Settle<Item>, on_rejected: Settle<Item>) -> Result<(), Item> {
            self.0.then(
                Reactions::new()
                    .on_fulfilled(move |value: Item| {
                        on_fulfilled(value.clone());
                        Ok(value)
                    })
                    .on_rejected(move |reason: Item| {
                        on_rejected(reason.clone());
                        Err(reason)
                    }),
            );
            Ok(())
        }

        fn resolver_id(&self) -> Option<ResolverId> {
            Some(self.0.id())
        }
    }

    impl Resolvable for Item {
        fn as_thenable(&self) -> Option<Rc<dyn Thenable<Self>>> {
            match self {
                Item::Later(resolver) => Some(Rc::new(Handle(resolver.clone()))),
                _ => None,
            }
        }

        fn from_error(error: Error) -> Self {
            Item::Failure(error.kind())
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, label: &'static str) -> Reactions<Item> {
        let log = Rc::clone(log);
        Reactions::new().on_fulfilled(move |value: Item| {
            log.borrow_mut().push(label.to_string());
            Ok(value)
        })
    }

    #[test]
    fn first_completion_wins() {
        let resolver = Resolver::new();
        resolver.resolve(Item::Num(1));
        resolver.reject(Item::Num(2));
        resolver.resolve(Item::Num(3));
        resolver.update(Item::Num(4));
        assert_eq!(resolver.state(), ResolverState::Fulfilled(Item::Num(1)));
    }

    #[test]
    fn drain_runs_in_registration_order_and_clears_links() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let resolver = Resolver::new();
        for label in ["a", "b", "c", "d"] {
            resolver.then(recorder(&log, label));
        }
        assert_eq!(resolver.pending_count(), 4);

        resolver.resolve(Item::Num(0));
        assert_eq!(*log.borrow(), vec!["a", "b", "c", "d"]);
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn registration_during_drain_is_triggered_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let resolver = Resolver::new();
        let inner_log = Rc::clone(&log);
        let reentrant = resolver.clone();
        resolver.then(Reactions::new().on_fulfilled(move |value: Item| {
            inner_log.borrow_mut().push("outer".to_string());
            reentrant.then(recorder(&inner_log, "nested"));
            Ok(value)
        }));
        resolver.then(recorder(&log, "second"));

        resolver.resolve(Item::Num(1));
        assert_eq!(*log.borrow(), vec!["outer", "nested", "second"]);
    }

    #[test]
    fn self_resolution_rejects() {
        let resolver = Resolver::new();
        resolver.resolve(Item::Later(resolver.clone()));
        assert_eq!(
            resolver.state(),
            ResolverState::Rejected(Item::Failure(ErrorKind::SelfResolution))
        );
    }

    #[test]
    fn pending_assimilation_leaves_resolver_open() {
        let outer = Resolver::new();
        let inner = Resolver::new();
        outer.resolve(Item::Later(inner.clone()));
        assert!(!outer.is_completed());
        assert_eq!(inner.pending_count(), 1);

        inner.resolve(Item::Num(8));
        assert_eq!(outer.state(), ResolverState::Fulfilled(Item::Num(8)));
    }

    #[test]
    fn throwing_thenable_rejects_only_before_settling() {
        let resolver: Resolver<Item> = Resolver::new();
        let thenable = ThenFn(|_ok: Settle<Item>, _err: Settle<Item>| -> Result<(), Item> {
            Err(Item::Failure(ErrorKind::Assimilation))
        });
        resolver.assimilate(&thenable);
        assert_eq!(
            resolver.state(),
            ResolverState::Rejected(Item::Failure(ErrorKind::Assimilation))
        );

        let resolver: Resolver<Item> = Resolver::new();
        let thenable = ThenFn(|ok: Settle<Item>, _err: Settle<Item>| -> Result<(), Item> {
            ok(Item::Num(5));
            Err(Item::Failure(ErrorKind::Assimilation))
        });
        resolver.assimilate(&thenable);
        assert_eq!(resolver.state(), ResolverState::Fulfilled(Item::Num(5)));
    }

    #[test]
    fn progress_stops_once_a_reaction_completes_the_resolver() {
        let resolver = Resolver::new();
        let seen = Rc::new(RefCell::new(0));
        let closer = resolver.clone();
        resolver.then(Reactions::new().on_progress(move |value: Item| {
            closer.resolve(Item::Num(0));
            value
        }));
        let counter = Rc::clone(&seen);
        resolver.then(Reactions::new().on_progress(move |value: Item| {
            *counter.borrow_mut() += 1;
            value
        }));

        resolver.update(Item::Num(1));
        assert_eq!(*seen.borrow(), 0);
        assert!(resolver.state().is_fulfilled());
    }

    #[test]
    fn long_pass_through_chain_settles_iteratively() {
        let head = Resolver::new();
        let mut tail = head.clone();
        for _ in 0..20_000 {
            tail = tail.then(Reactions::new());
        }
        assert!(!tail.state().is_settled());

        head.reject(Item::Num(9));
        assert_eq!(tail.state(), ResolverState::Rejected(Item::Num(9)));
        assert!(tail.state().is_settled());
    }

    #[test]
    fn deep_adoption_chain_flattens() {
        let resolvers: Vec<Resolver<Item>> = (0..5_000).map(|_| Resolver::new()).collect();
        for pair in resolvers.windows(2) {
            pair[0].resolve(Item::Later(pair[1].clone()));
        }
        assert!(resolvers.iter().all(|resolver| !resolver.is_completed()));

        resolvers[resolvers.len() - 1].resolve(Item::Num(3));
        assert!(
            resolvers
                .iter()
                .all(|resolver| resolver.state() == ResolverState::Fulfilled(Item::Num(3)))
        );
    }

    #[test]
    fn dropping_long_pending_chain_is_iterative() {
        let head: Resolver<Item> = Resolver::new();
        let mut tail = head.clone();
        for _ in 0..100_000 {
            tail = tail.then(Reactions::new());
        }
        drop(tail);
        assert_eq!(head.pending_count(), 1);
        drop(head);
    }

    #[test]
    fn debug_output_names_state() {
        let resolver: Resolver<Item> = Resolver::new();
        let rendered = format!("{resolver:?}");
        assert!(rendered.contains("pending"));
        resolver.reject(Item::Num(1));
        assert!(format!("{resolver:?}").contains("rejected"));
    }
}
