//! kubestate collectors: per-kind metric family tables, the kind registry and
//! the builder wiring families, stores and reflectors together.

#![forbid(unsafe_code)]

mod builder;
mod collector;
mod registry;
pub mod resources;

pub use builder::Builder;
pub use collector::Collector;
pub use registry::{FamilyOptions, Registry};
pub use resources::default_registry;

use kubestate_core::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no allow/deny family filter configured")]
    MissingFilter,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
