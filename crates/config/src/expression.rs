//! Expression - tiny arithmetic over the config environment
//!
//! Several integer settings accept either a literal or one binary
//! operation over named values, e.g. `"capacity/4"` or `"maxprocs*4"`.
//! The grammar is deliberately minimal: two operands, one of `+ - * /`,
//! operands are integers or known variable names.

use serde::de::{Deserialize, Deserializer};

use crate::error::{ConfigError, Result};

#[cfg(test)]
#[path = "expression_test.rs"]
mod tests;

/// Unresolved expression as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression(String);

impl Expression {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Evaluate against the given variable bindings.
    pub fn resolve(&self, values: &[(&str, i64)]) -> Result<i64> {
        let expr = self.0.trim();

        let Some(pos) = expr.find(['*', '/', '+', '-']) else {
            return expr.parse::<i64>().map_err(|_| self.err("not an integer"));
        };

        let op = expr.as_bytes()[pos] as char;
        let lhs = self.operand(&expr[..pos], values)?;
        let rhs = self.operand(&expr[pos + 1..], values)?;

        match op {
            '+' => Ok(lhs + rhs),
            '-' => Ok(lhs - rhs),
            '*' => Ok(lhs * rhs),
            '/' if rhs != 0 => Ok(lhs / rhs),
            '/' => Err(self.err("division by zero")),
            _ => Err(self.err("unknown operation")),
        }
    }

    fn operand(&self, raw: &str, values: &[(&str, i64)]) -> Result<i64> {
        let raw = raw.trim();
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(n);
        }
        values
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, v)| *v)
            .ok_or_else(|| self.err(format!("unknown value {raw:?}")))
    }

    fn err(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Expression {
            expr: self.0.clone(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Config files may write either `workers_count: 16` or
// `workers_count: "maxprocs*4"`.
impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Self(s)),
            serde_json::Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected integer or expression string, got {other}"
            ))),
        }
    }
}
