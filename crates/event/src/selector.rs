//! FieldSelector - dotted field addressing
//!
//! Selectors address nested fields with `.` as the separator. Two
//! escapes exist: `\.` keeps a literal dot inside a key, and `..`
//! embeds a dotted key (`a..b` addresses the single key `a.b`).

#[cfg(test)]
#[path = "selector_test.rs"]
mod tests;

/// Parsed field path, one element per nesting level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector(Vec<String>);

impl FieldSelector {
    /// Parse a dotted selector string.
    pub fn parse(selector: &str) -> Self {
        let mut result = Vec::new();
        let mut tail = String::new();
        let mut rest = selector;

        loop {
            let Some(pos) = rest.find('.') else { break };

            // `\.` escapes a literal dot inside a key
            if pos > 0 && rest.as_bytes()[pos - 1] == b'\\' {
                tail.push_str(&rest[..pos - 1]);
                tail.push('.');
                rest = &rest[pos + 1..];
                continue;
            }

            // `..` embeds a dotted key
            if rest.len() > pos + 1 && rest.as_bytes()[pos + 1] == b'.' {
                tail.push_str(&rest[..pos + 1]);
                rest = &rest[pos + 2..];
                continue;
            }

            result.push(format!("{tail}{}", &rest[..pos]));
            rest = &rest[pos + 1..];
            tail.clear();
        }

        if !rest.is_empty() || !tail.is_empty() {
            result.push(format!("{tail}{rest}"));
        }

        Self(result)
    }

    #[inline]
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for FieldSelector {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
