use std::fmt;
use std::sync::Arc;

use kubestate_store::MetricsDump;

/// Unit registered with the serving layer: one store and its dump.
#[derive(Clone)]
pub struct Collector {
    store: Arc<dyn MetricsDump>,
}

impl Collector {
    pub fn new(store: Arc<dyn MetricsDump>) -> Self {
        Self { store }
    }

    pub fn resource(&self) -> &str {
        self.store.resource()
    }

    pub fn write_all(&self, out: &mut String) {
        self.store.write_all(out);
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.write_all(&mut out);
        out
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector").field("resource", &self.resource()).finish()
    }
}
