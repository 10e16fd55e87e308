//! kubestate kubehub: list/watch sources and the reflectors feeding metric stores.

#![forbid(unsafe_code)]

pub mod discovery;
pub mod reflector;
pub mod source;

pub use discovery::{served_resources, ServedResource};
pub use reflector::{Reflector, ReflectorConfig};
pub use source::{
    clamp_watch_timeout, KubeListerWatcher, KubeSourceFactory, ListResult, ListerWatcher, SourceFactory, WatchStream,
    DEFAULT_WATCH_TIMEOUT_SECS, MAX_WATCH_TIMEOUT_SECS,
};
