//! Prompt template rendering.
//!
//! Templates live in a YAML file with a `template` key and use
//! `{{ name }}` placeholders.

use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct PromptFile {
    #[serde(default)]
    template: String,
}

pub struct PromptRenderer {
    template: String,
    placeholder: Regex,
}

impl PromptRenderer {
    pub fn from_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            placeholder: Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("placeholder pattern is valid"),
        }
    }

    /// Load the template file. An unreadable or malformed file yields an
    /// empty template so rendering never fails.
    pub fn load(path: &Path) -> Self {
        let template = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str::<PromptFile>(&raw) {
                Ok(file) => file.template,
                Err(e) => {
                    log::warn!("Failed to parse prompt file {:?}: {}", path, e);
                    String::new()
                }
            },
            Err(e) => {
                log::warn!("Failed to read prompt file {:?}: {}", path, e);
                String::new()
            }
        };
        Self::from_template(template)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitute every placeholder; names without a value render as "".
    pub fn render(&self, vars: &HashMap<&str, String>) -> String {
        self.placeholder
            .replace_all(&self.template, |caps: &Captures<'_>| {
                vars.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}
