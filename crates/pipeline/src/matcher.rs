//! Matcher - per-action condition evaluation
//!
//! Each action may carry conditions of (field selector, needle).
//! Literal needles compare by exact string, `/.../` needles by regexp
//! full-match. The match mode decides how conditions combine and
//! whether a rejection ends the whole chain (`-prefix` modes); the
//! invert flag negates the final result.

use regex::Regex;

use sluice_event::{Event, FieldSelector};
use sluice_plugin::MatchMode;

use crate::error::{PipelineError, Result};

#[cfg(test)]
#[path = "matcher_test.rs"]
mod tests;

/// What a condition compares the field value against.
#[derive(Debug, Clone)]
pub enum Needle {
    /// Exact string equality.
    Literal(String),
    /// Full-match regexp, written `/.../` in config.
    Regex(Regex),
}

/// One (field path, needle) condition.
#[derive(Debug, Clone)]
pub struct Condition {
    pub selector: FieldSelector,
    pub needle: Needle,
}

impl Condition {
    /// Build a condition from config strings. A needle surrounded by
    /// slashes compiles as a regexp, anchored to match the whole
    /// value.
    pub fn new(field: &str, needle: &str) -> Result<Self> {
        let selector = FieldSelector::parse(field);
        if selector.is_empty() {
            return Err(PipelineError::Matcher {
                field: field.to_string(),
                reason: "empty field selector".to_string(),
            });
        }

        let needle = if needle.len() >= 2 && needle.starts_with('/') && needle.ends_with('/') {
            let inner = &needle[1..needle.len() - 1];
            if inner.is_empty() {
                return Err(PipelineError::Matcher {
                    field: field.to_string(),
                    reason: "empty regexp".to_string(),
                });
            }
            let re = Regex::new(&format!("^(?:{inner})$")).map_err(|e| PipelineError::Matcher {
                field: field.to_string(),
                reason: e.to_string(),
            })?;
            Needle::Regex(re)
        } else {
            Needle::Literal(needle.to_string())
        };

        Ok(Self { selector, needle })
    }

    fn matches(&self, event: &Event) -> bool {
        let Some(value) = event.get_path(&self.selector) else {
            return false;
        };
        // Non-string scalars compare through their JSON rendering, so
        // `{"x": 1}` matches the literal needle "1".
        match value.as_str() {
            Some(s) => self.needle.matches(s),
            None => self.needle.matches(&value.to_string()),
        }
    }
}

impl Needle {
    fn matches(&self, value: &str) -> bool {
        match self {
            Needle::Literal(s) => s == value,
            Needle::Regex(re) => re.is_match(value),
        }
    }
}

/// Compiled match rule of one action chain entry. Immutable after
/// pipeline start and shared by all processor workers.
#[derive(Debug, Clone)]
pub struct Matcher {
    conditions: Vec<Condition>,
    mode: MatchMode,
    invert: bool,
}

impl Matcher {
    pub fn new(conditions: Vec<Condition>, mode: MatchMode, invert: bool) -> Self {
        Self {
            conditions,
            mode,
            invert,
        }
    }

    /// A matcher with no conditions: accepts everything.
    pub fn always() -> Self {
        Self::new(Vec::new(), MatchMode::And, false)
    }

    #[inline]
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// True when a rejection must terminate the chain.
    #[inline]
    pub fn terminates_chain(&self) -> bool {
        matches!(self.mode, MatchMode::AndPrefix | MatchMode::OrPrefix)
    }

    /// Evaluate against an event tree.
    pub fn matches(&self, event: &Event) -> bool {
        if self.conditions.is_empty() {
            return true;
        }

        let matched = match self.mode {
            MatchMode::And | MatchMode::AndPrefix => {
                self.conditions.iter().all(|c| c.matches(event))
            }
            MatchMode::Or | MatchMode::OrPrefix => {
                self.conditions.iter().any(|c| c.matches(event))
            }
        };

        matched != self.invert
    }
}
