//! Metric model and Prometheus text (0.0.4) rendering.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::RenderError;

/// Ordered label keys or values of one metric.
pub type LabelList = SmallVec<[String; 6]>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MetricType {
    Gauge,
    Counter,
    Info,
    StateSet,
}

impl MetricType {
    /// Type keyword written on the `# TYPE` line. The 0.0.4 text format has no
    /// info/stateset types, so both are exposed as gauges.
    pub fn exposition_type(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge | MetricType::Info | MetricType::StateSet => "gauge",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Info => "info",
            MetricType::StateSet => "stateset",
        };
        f.write_str(s)
    }
}

/// Static description of a metric family: everything the `# HELP` / `# TYPE`
/// header needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FamilyHeader {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
}

impl FamilyHeader {
    pub fn new(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType) -> Self {
        Self { name: name.into(), help: help.into(), metric_type }
    }

    pub fn render(&self, out: &mut String) {
        out.push_str("# HELP ");
        out.push_str(&self.name);
        out.push(' ');
        escape_help(&self.help, out);
        out.push('\n');
        out.push_str("# TYPE ");
        out.push_str(&self.name);
        out.push(' ');
        out.push_str(self.metric_type.exposition_type());
        out.push('\n');
    }

    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.name.len() * 2 + self.help.len() + 24);
        self.render(&mut out);
        out
    }
}

/// One sample: label set plus value. Key and value lists must line up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub label_keys: LabelList,
    pub label_values: LabelList,
    pub value: f64,
}

impl Metric {
    pub fn new(value: f64) -> Self {
        Self { label_keys: LabelList::new(), label_values: LabelList::new(), value }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.label_keys.push(key.into());
        self.label_values.push(value.into());
        self
    }

    pub fn with_labels<I, A, B>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        for (k, v) in pairs {
            self.label_keys.push(k.into());
            self.label_values.push(v.into());
        }
        self
    }

    /// Insert `keys`/`values` in front of the existing labels.
    pub fn prepend_labels(&mut self, keys: &[&str], values: &[&str]) {
        for (i, (k, v)) in keys.iter().zip(values.iter()).enumerate() {
            self.label_keys.insert(i, (*k).to_string());
            self.label_values.insert(i, (*v).to_string());
        }
    }

    /// Write one exposition line for family `name`.
    pub fn render(&self, name: &str, out: &mut String) -> Result<(), RenderError> {
        if self.label_keys.len() != self.label_values.len() {
            return Err(RenderError::LabelMismatch {
                family: name.to_string(),
                keys: self.label_keys.len(),
                values: self.label_values.len(),
            });
        }
        for (i, k) in self.label_keys.iter().enumerate() {
            if self.label_keys[..i].contains(k) {
                return Err(RenderError::DuplicateLabel { family: name.to_string(), label: k.clone() });
            }
        }
        out.push_str(name);
        if !self.label_keys.is_empty() {
            out.push('{');
            for (i, (k, v)) in self.label_keys.iter().zip(self.label_values.iter()).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(k);
                out.push_str("=\"");
                escape_label_value(v, out);
                out.push('"');
            }
            out.push('}');
        }
        out.push(' ');
        write_value(self.value, out);
        out.push('\n');
        Ok(())
    }
}

/// Metrics one generator produced for one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Family {
    pub metrics: Vec<Metric>,
}

impl Family {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(metric: Metric) -> Self {
        Self { metrics: vec![metric] }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Render every metric line of this family. Either the whole body is
    /// produced or nothing is appended.
    pub fn render(&self, name: &str, out: &mut String) -> Result<(), RenderError> {
        let mark = out.len();
        for m in &self.metrics {
            if let Err(e) = m.render(name, out) {
                out.truncate(mark);
                return Err(e);
            }
        }
        Ok(())
    }
}

impl From<Vec<Metric>> for Family {
    fn from(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }
}

fn escape_label_value(v: &str, out: &mut String) {
    for c in v.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

fn escape_help(v: &str, out: &mut String) {
    for c in v.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

fn write_value(v: f64, out: &mut String) {
    if v.is_nan() {
        out.push_str("NaN");
    } else if v.is_infinite() {
        out.push_str(if v > 0.0 { "+Inf" } else { "-Inf" });
    } else {
        // f64 Display prints integral values without a fraction ("3", not "3.0").
        let _ = write!(out, "{}", v);
    }
}
