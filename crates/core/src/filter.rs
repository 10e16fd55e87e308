//! Allow/deny policy over metric family names.

use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Answers whether a metric family should be exposed.
pub trait FamilyFilter: Send + Sync {
    fn is_included(&self, family: &str) -> bool;
    fn is_excluded(&self, family: &str) -> bool;
}

/// Fate of a name matching neither list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnlistedPolicy {
    /// Admit when the allow list is empty, deny otherwise.
    #[default]
    Auto,
    Admit,
    Deny,
}

impl FromStr for UnlistedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "admit" => Ok(Self::Admit),
            "deny" => Ok(Self::Deny),
            other => Err(format!("unknown unlisted policy: {} (expect auto, admit or deny)", other)),
        }
    }
}

/// Allow and deny lists of anchored regular expressions. Deny always wins.
#[derive(Debug, Clone, Default)]
pub struct AllowDenyList {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
    unlisted: UnlistedPolicy,
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(&format!("^(?:{})$", p)).map_err(|e| ConfigError::InvalidPattern { pattern: p.to_string(), reason: e.to_string() })
        })
        .collect()
}

impl AllowDenyList {
    pub fn new(allow: &[String], deny: &[String], unlisted: UnlistedPolicy) -> Result<Self, ConfigError> {
        Ok(Self { allow: compile(allow)?, deny: compile(deny)?, unlisted })
    }

    /// Admit everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    fn admits_unlisted(&self) -> bool {
        match self.unlisted {
            UnlistedPolicy::Auto => self.allow.is_empty(),
            UnlistedPolicy::Admit => true,
            UnlistedPolicy::Deny => false,
        }
    }

    /// Human-readable summary for startup logs.
    pub fn status(&self) -> String {
        let join = |v: &[Regex]| v.iter().map(|r| r.as_str().trim_start_matches("^(?:").trim_end_matches(")$").to_string()).collect::<Vec<_>>().join(",");
        format!("allow=[{}] deny=[{}] unlisted={:?}", join(&self.allow), join(&self.deny), self.unlisted)
    }
}

impl FamilyFilter for AllowDenyList {
    fn is_included(&self, family: &str) -> bool {
        if self.is_excluded(family) {
            return false;
        }
        if self.allow.iter().any(|r| r.is_match(family)) {
            return true;
        }
        self.admits_unlisted()
    }

    fn is_excluded(&self, family: &str) -> bool {
        self.deny.iter().any(|r| r.is_match(family))
    }
}
