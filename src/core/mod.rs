// Core modules implementing the resolution engine, its pending links, and error modeling.
pub mod cascade;
pub mod consequence;
pub mod error;
pub mod resolver;
pub mod thenable;
