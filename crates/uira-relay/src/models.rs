//! External model name -> upstream model id lookup.

use std::collections::BTreeMap;

/// Built-in mapping from OpenAI/Anthropic/Google style names to upstream ids.
pub const DEFAULT_MODEL_MAP: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "nvidia/llama-3.1-nemotron-ultra-253b-v1"),
    ("gpt-4", "qwen/qwen3-coder-480b-a35b-instruct"),
    ("gpt-4-turbo", "moonshotai/kimi-k2-instruct-0905"),
    ("gpt-4o", "deepseek-ai/deepseek-v3.1"),
    ("claude-3-opus", "openai/gpt-oss-120b"),
    ("claude-3-sonnet", "openai/gpt-oss-20b"),
    ("gemini-pro", "qwen/qwen3-next-80b-a3b-thinking"),
];

const LARGE_TIER: &str = "meta/llama-3.1-405b-instruct";
const MEDIUM_TIER: &str = "meta/llama-3.1-70b-instruct";
const SMALL_TIER: &str = "meta/llama-3.1-8b-instruct";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMap {
    entries: BTreeMap<String, String>,
}

impl Default for ModelMap {
    fn default() -> Self {
        Self {
            entries: DEFAULT_MODEL_MAP
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl ModelMap {
    pub fn insert(&mut self, external: impl Into<String>, upstream: impl Into<String>) {
        self.entries.insert(external.into(), upstream.into());
    }

    pub fn get(&self, external: &str) -> Option<&str> {
        self.entries.get(external).map(|s| s.as_str())
    }

    /// Resolve the upstream model id for a requested model.
    ///
    /// Exact table hits win. Ids that already look provider-qualified
    /// (`vendor/model`) pass through untouched; anything else falls back to a
    /// size tier picked from the name.
    pub fn resolve(&self, requested: &str) -> String {
        if let Some(mapped) = self.get(requested) {
            return mapped.to_string();
        }
        if requested.contains('/') {
            return requested.to_string();
        }

        let lower = requested.to_ascii_lowercase();
        let tier = if ["gpt-4", "opus", "405b"].iter().any(|k| lower.contains(k)) {
            LARGE_TIER
        } else if ["claude", "gemini", "70b"].iter().any(|k| lower.contains(k)) {
            MEDIUM_TIER
        } else {
            SMALL_TIER
        };
        tier.to_string()
    }

    /// External ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}
