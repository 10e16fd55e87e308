//! Object labels/annotations as metric labels.

use std::collections::{BTreeMap, HashMap};

use crate::ConfigError;

/// Map an arbitrary key onto the metric label charset `[a-zA-Z0-9_]`.
pub fn sanitize_label_name(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

/// Per-kind list of object label (or annotation) keys to expose. `*` admits
/// every key of that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelAllowlist {
    kinds: HashMap<String, Vec<String>>,
}

impl LabelAllowlist {
    /// Parse `pods=[app,team],nodes=[*]`. Brackets are optional for a single key.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let mut kinds: HashMap<String, Vec<String>> = HashMap::new();
        let mut rest = s.trim();
        while !rest.is_empty() {
            let (kind, after) = rest
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidLabelAllowlist(format!("missing '=' in {:?}", rest)))?;
            let kind = kind.trim().trim_start_matches(',').trim();
            if kind.is_empty() {
                return Err(ConfigError::InvalidLabelAllowlist(format!("empty resource name in {:?}", s)));
            }
            let after = after.trim_start();
            let (keys, tail) = if let Some(inner) = after.strip_prefix('[') {
                let end = inner
                    .find(']')
                    .ok_or_else(|| ConfigError::InvalidLabelAllowlist(format!("unterminated '[' for {}", kind)))?;
                (&inner[..end], &inner[end + 1..])
            } else {
                match after.find(',') {
                    Some(i) => (&after[..i], &after[i..]),
                    None => (after, ""),
                }
            };
            let entry = kinds.entry(kind.to_string()).or_default();
            entry.extend(keys.split(',').map(str::trim).filter(|k| !k.is_empty()).map(str::to_string));
            rest = tail.trim().trim_start_matches(',').trim();
        }
        Ok(Self { kinds })
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Keys allowed for `kind`; empty when nothing was configured.
    pub fn for_kind(&self, kind: &str) -> Vec<String> {
        self.kinds.get(kind).cloned().unwrap_or_default()
    }
}

/// Turn the allowed entries of `map` into `(prefix_key, value)` label pairs,
/// ordered by source key. Keys that sanitize to the same name all get a
/// `_conflictN` suffix, numbered in source key order.
pub fn allowed_label_pairs(prefix: &str, map: Option<&BTreeMap<String, String>>, allowed: &[String]) -> Vec<(String, String)> {
    let Some(map) = map else { return Vec::new() };
    let all = allowed.iter().any(|k| k == "*");
    let pairs: Vec<(String, &String)> = map
        .iter()
        .filter(|(k, _)| all || allowed.iter().any(|a| a == *k))
        .map(|(k, v)| (format!("{}_{}", prefix, sanitize_label_name(k)), v))
        .collect();

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (name, _) in &pairs {
        *seen.entry(name.as_str()).or_default() += 1;
    }
    let mut nth: HashMap<&str, usize> = HashMap::new();
    pairs
        .iter()
        .map(|(name, v)| {
            let total = seen.get(name.as_str()).copied().unwrap_or(1);
            if total == 1 {
                return (name.clone(), (*v).clone());
            }
            let n = nth.entry(name.as_str()).or_default();
            *n += 1;
            (format!("{}_conflict{}", name, n), (*v).clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        let l = LabelAllowlist::parse("pods=[app,team], nodes=[*],services=tier").unwrap();
        assert_eq!(l.for_kind("pods"), vec!["app", "team"]);
        assert_eq!(l.for_kind("nodes"), vec!["*"]);
        assert_eq!(l.for_kind("services"), vec!["tier"]);
        assert!(l.for_kind("jobs").is_empty());
        assert!(LabelAllowlist::parse("").unwrap().is_empty());
    }

    #[test]
    fn parse_errors() {
        assert!(LabelAllowlist::parse("pods").is_err());
        assert!(LabelAllowlist::parse("pods=[app").is_err());
        assert!(LabelAllowlist::parse("=[app]").is_err());
    }

    #[test]
    fn pairs_are_sanitized_and_filtered() {
        let mut m = BTreeMap::new();
        m.insert("app.kubernetes.io/name".to_string(), "web".to_string());
        m.insert("team".to_string(), "core".to_string());
        let all = allowed_label_pairs("label", Some(&m), &["*".to_string()]);
        assert_eq!(
            all,
            vec![
                ("label_app_kubernetes_io_name".to_string(), "web".to_string()),
                ("label_team".to_string(), "core".to_string())
            ]
        );
        let some = allowed_label_pairs("label", Some(&m), &["team".to_string()]);
        assert_eq!(some, vec![("label_team".to_string(), "core".to_string())]);
        assert!(allowed_label_pairs("label", None, &["*".to_string()]).is_empty());
        assert!(allowed_label_pairs("label", Some(&m), &[]).is_empty());
    }

    #[test]
    fn colliding_keys_get_numbered_suffixes() {
        let m = BTreeMap::from([
            ("app-name".to_string(), "y".to_string()),
            ("app.name".to_string(), "x".to_string()),
            ("team".to_string(), "core".to_string()),
        ]);
        let pairs = allowed_label_pairs("label", Some(&m), &["*".to_string()]);
        assert_eq!(
            pairs,
            vec![
                ("label_app_name_conflict1".to_string(), "y".to_string()),
                ("label_app_name_conflict2".to_string(), "x".to_string()),
                ("label_team".to_string(), "core".to_string()),
            ]
        );
        // Only one of the two selected: no conflict, no suffix.
        let one = allowed_label_pairs("label", Some(&m), &["app.name".to_string()]);
        assert_eq!(one, vec![("label_app_name".to_string(), "x".to_string())]);
    }
}
