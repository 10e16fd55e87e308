//! Metric family generators and their composition into one render function.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::filter::FamilyFilter;
use crate::metric::{Family, FamilyHeader, MetricType};
use crate::{ConfigError, RenderError};

type GenerateFn<K> = dyn Fn(&K) -> Result<Family, RenderError> + Send + Sync;

/// Declarative description of one metric family for objects of type `K`.
pub struct FamilyGenerator<K> {
    header: Arc<FamilyHeader>,
    generate: Arc<GenerateFn<K>>,
}

impl<K> Clone for FamilyGenerator<K> {
    fn clone(&self) -> Self {
        Self { header: Arc::clone(&self.header), generate: Arc::clone(&self.generate) }
    }
}

impl<K> fmt::Debug for FamilyGenerator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyGenerator").field("header", &self.header).finish_non_exhaustive()
    }
}

impl<K> FamilyGenerator<K> {
    pub fn new<F>(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType, generate: F) -> Self
    where
        F: Fn(&K) -> Result<Family, RenderError> + Send + Sync + 'static,
    {
        Self {
            header: Arc::new(FamilyHeader::new(name, help, metric_type)),
            generate: Arc::new(generate),
        }
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn header(&self) -> &FamilyHeader {
        &self.header
    }

    pub fn generate(&self, obj: &K) -> Result<Family, RenderError> {
        (self.generate)(obj)
    }
}

/// One family's rendered output for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFamily {
    pub header: Arc<FamilyHeader>,
    /// Exposition lines only; the header is written once per family at dump time.
    pub body: String,
}

impl RenderedFamily {
    /// Header pair followed by the body, as a standalone block.
    pub fn to_text(&self) -> String {
        let mut out = self.header.to_text();
        out.push_str(&self.body);
        out
    }
}

/// Keep only generators whose family name the filter admits.
pub fn filter_families<K>(filter: &dyn FamilyFilter, families: Vec<FamilyGenerator<K>>) -> Vec<FamilyGenerator<K>> {
    families.into_iter().filter(|f| filter.is_included(f.name())).collect()
}

/// A fixed, ordered list of generators folded into one render function.
pub struct ComposedGenerator<K> {
    families: Arc<[FamilyGenerator<K>]>,
}

impl<K> Clone for ComposedGenerator<K> {
    fn clone(&self) -> Self {
        Self { families: Arc::clone(&self.families) }
    }
}

impl<K> ComposedGenerator<K> {
    /// Compose `families` in the given order. Family names must be unique.
    pub fn compose(families: Vec<FamilyGenerator<K>>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(families.len());
        for f in &families {
            if !seen.insert(f.name()) {
                return Err(ConfigError::DuplicateFamily(f.name().to_string()));
            }
        }
        Ok(Self { families: families.into() })
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Headers in render order.
    pub fn headers(&self) -> Vec<Arc<FamilyHeader>> {
        self.families.iter().map(|f| Arc::clone(&f.header)).collect()
    }

    /// Run every generator over `obj`, in order. A failing generator yields an
    /// empty body for its family; the failure is logged and counted.
    pub fn render(&self, obj: &K) -> Vec<RenderedFamily> {
        self.families
            .iter()
            .map(|f| {
                let mut body = String::new();
                let rendered = f.generate(obj).and_then(|family| family.render(f.name(), &mut body));
                if let Err(e) = rendered {
                    warn!(family = %f.name(), error = %e, "metric family render failed; emitting header only");
                    metrics::counter!("kube_state_metrics_render_errors_total", "family" => f.name().to_string()).increment(1);
                    body.clear();
                }
                RenderedFamily { header: Arc::clone(&f.header), body }
            })
            .collect()
    }
}
