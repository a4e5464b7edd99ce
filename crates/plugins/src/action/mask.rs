//! Mask action - redacts sensitive substrings in string values
//!
//! Each mask is a regexp plus the capture groups to hide. Matched
//! group text is replaced character-for-character with `*` (capped by
//! `max_count`), or wholesale by `replace_word`. Masks apply to every
//! string value in the event tree.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use sluice_event::Event;
use sluice_plugin::{ActionParams, ActionPlugin, ActionResult, PluginConfig, PluginError};

#[cfg(test)]
#[path = "mask_test.rs"]
mod tests;

#[derive(Debug, Clone, Deserialize)]
struct MaskConfig {
    masks: Vec<MaskRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct MaskRule {
    /// Regexp whose groups get masked.
    re: String,

    /// Capture group indexes to hide; 0 is the whole match.
    groups: Vec<usize>,

    /// Replace the group with this word instead of asterisks.
    #[serde(default)]
    replace_word: Option<String>,

    /// Cap on the number of asterisks per masked group.
    #[serde(default)]
    max_count: Option<usize>,
}

struct CompiledMask {
    re: Regex,
    groups: Vec<usize>,
    replace_word: Option<String>,
    max_count: Option<usize>,
}

#[derive(Default)]
pub struct MaskAction {
    masks: Vec<CompiledMask>,
}

impl ActionPlugin for MaskAction {
    fn start(&mut self, config: &PluginConfig, _params: &ActionParams) -> Result<(), PluginError> {
        let config: MaskConfig =
            serde_json::from_value(config.clone()).map_err(PluginError::config)?;
        if config.masks.is_empty() {
            return Err(PluginError::Config("mask: no masks configured".into()));
        }

        self.masks = config
            .masks
            .into_iter()
            .map(|rule| {
                let re = Regex::new(&rule.re)
                    .map_err(|e| PluginError::Config(format!("mask: bad regexp: {e}")))?;
                let max_group = re.captures_len();
                for &g in &rule.groups {
                    if g >= max_group {
                        return Err(PluginError::Config(format!(
                            "mask: group {g} out of range for {:?}",
                            rule.re
                        )));
                    }
                }
                Ok(CompiledMask {
                    re,
                    groups: rule.groups,
                    replace_word: rule.replace_word,
                    max_count: rule.max_count,
                })
            })
            .collect::<Result<_, PluginError>>()?;
        Ok(())
    }

    fn apply(&mut self, mut event: Box<Event>) -> ActionResult {
        mask_tree(event.root_mut(), &self.masks);
        ActionResult::Pass(event)
    }
}

fn mask_tree(value: &mut Value, masks: &[CompiledMask]) {
    match value {
        Value::String(s) => {
            for mask in masks {
                if let Some(masked) = mask_value(s, mask) {
                    *s = masked;
                }
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                mask_tree(v, masks);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                mask_tree(v, masks);
            }
        }
        _ => {}
    }
}

/// Apply one mask to a string; `None` when nothing matched.
fn mask_value(input: &str, mask: &CompiledMask) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut copied = 0usize;
    let mut changed = false;

    for caps in mask.re.captures_iter(input) {
        for &group in &mask.groups {
            let Some(m) = caps.get(group) else { continue };
            if m.start() < copied {
                continue;
            }
            out.push_str(&input[copied..m.start()]);
            match &mask.replace_word {
                Some(word) => out.push_str(word),
                None => {
                    let mut stars = m.as_str().chars().count();
                    if let Some(cap) = mask.max_count {
                        stars = stars.min(cap);
                    }
                    for _ in 0..stars {
                        out.push('*');
                    }
                }
            }
            copied = m.end();
            changed = true;
        }
    }

    if !changed {
        return None;
    }
    out.push_str(&input[copied..]);
    Some(out)
}
