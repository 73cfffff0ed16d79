//! Rule key computation.

mod builder;
mod factory;

pub use builder::{FieldResolver, RuleKeyBuilder};
pub use factory::{KeyKind, RuleKeyFactory};
