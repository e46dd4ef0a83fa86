//! Purpose: Define the public Rust API boundary for the resolution engine.
//! Exports: Producer/consumer handles, the engine, payload traits and errors.
//! Role: Public surface; core modules stay private behind these re-exports.
//! Invariants: Handles only delegate to `Resolver`; no resolution logic lives here.

mod deferred;
mod promise;
mod value;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::consequence::{ProgressReaction, Reaction, Reactions};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::resolver::{CompletionAction, Resolver, ResolverState};
pub use crate::core::thenable::{Resolvable, ResolverId, Settle, ThenFn, Thenable};
pub use deferred::Deferred;
pub use promise::Promise;
pub use value::Value;
