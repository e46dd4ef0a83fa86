// Pending continuations: one registered reaction set plus the resolver for its result.
use crate::core::resolver::{CompletionAction, Resolver};
use crate::core::thenable::Resolvable;
use std::cell::Cell;

/// Success or failure transform. `Err` is the transform throwing.
pub type Reaction<V> = Box<dyn FnOnce(V) -> Result<V, V>>;

/// Progress transform; its return value is what downstream links observe.
pub type ProgressReaction<V> = Box<dyn Fn(V) -> V>;

/// The optional callbacks handed to a single registration.
pub struct Reactions<V> {
    on_fulfilled: Option<Reaction<V>>,
    on_rejected: Option<Reaction<V>>,
    on_progress: Option<ProgressReaction<V>>,
}

impl<V> Reactions<V> {
    pub fn new() -> Self {
        Self {
            on_fulfilled: None,
            on_rejected: None,
            on_progress: None,
        }
    }

    pub fn on_fulfilled(mut self, reaction: impl FnOnce(V) -> Result<V, V> + 'static) -> Self {
        self.on_fulfilled = Some(Box::new(reaction));
        self
    }

    pub fn on_rejected(mut self, reaction: impl FnOnce(V) -> Result<V, V> + 'static) -> Self {
        self.on_rejected = Some(Box::new(reaction));
        self
    }

    pub fn on_progress(mut self, reaction: impl Fn(V) -> V + 'static) -> Self {
        self.on_progress = Some(Box::new(reaction));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_fulfilled.is_none() && self.on_rejected.is_none() && self.on_progress.is_none()
    }
}

impl<V> Default for Reactions<V> {
    fn default() -> Self {
        Self::new()
    }
}

struct Outcomes<V> {
    on_fulfilled: Option<Reaction<V>>,
    on_rejected: Option<Reaction<V>>,
}

pub(crate) struct Consequence<V: Resolvable> {
    // Taken on the first trigger; a second trigger finds it empty.
    outcomes: Cell<Option<Outcomes<V>>>,
    on_progress: Option<ProgressReaction<V>>,
    resolver: Resolver<V>,
}

impl<V: Resolvable> Consequence<V> {
    pub(crate) fn new(reactions: Reactions<V>) -> Self {
        let Reactions {
            on_fulfilled,
            on_rejected,
            on_progress,
        } = reactions;
        Self {
            outcomes: Cell::new(Some(Outcomes {
                on_fulfilled,
                on_rejected,
            })),
            on_progress,
            resolver: Resolver::new(),
        }
    }

    pub(crate) fn resolver(&self) -> &Resolver<V> {
        &self.resolver
    }

    pub(crate) fn into_resolver(self) -> Resolver<V> {
        self.resolver
    }

    /// Applies the matching reaction (or passes the outcome through) and
    /// settles the owned resolver with the result.
    pub(crate) fn trigger(&self, action: CompletionAction, value: V) {
        let Some(outcomes) = self.outcomes.take() else {
            return;
        };
        let reaction = match action {
            CompletionAction::Fulfill => outcomes.on_fulfilled,
            CompletionAction::Reject => outcomes.on_rejected,
        };

        match reaction {
            Some(reaction) => match reaction(value) {
                Ok(result) => self.resolver.resolve(result),
                Err(reason) => self.resolver.reject(reason),
            },
            None => match action {
                CompletionAction::Fulfill => self.resolver.resolve(value),
                CompletionAction::Reject => self.resolver.reject(value),
            },
        }
    }

    pub(crate) fn update(&self, progress: V) {
        let progress = match &self.on_progress {
            Some(reaction) => reaction(progress),
            None => progress,
        };
        self.resolver.update(progress);
    }
}
