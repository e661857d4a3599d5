//! Model catalog: alias resolution and reasoning-model classification.
//!
//! Callers may name models by shorthand (`"4o"`, `"sonnet"`) or by their
//! canonical `provider/model` id. [`ModelCatalog::resolve`] maps the former
//! to the latter and passes anything it does not know through unchanged, so
//! new upstream models work without a catalog update.

use std::collections::HashMap;

/// Built-in shorthand and historical names, lowercase.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("4o", "openai/gpt-4o"),
    ("gpt-4o", "openai/gpt-4o"),
    ("4o-mini", "openai/gpt-4o-mini"),
    ("gpt-4o-mini", "openai/gpt-4o-mini"),
    ("gpt-4", "openai/gpt-4o"),
    ("gpt-4-turbo", "openai/gpt-4o"),
    ("gpt-3.5-turbo", "openai/gpt-4o-mini"),
    ("4.1", "openai/gpt-4.1"),
    ("gpt-4.1", "openai/gpt-4.1"),
    ("o1", "openai/o1"),
    ("o3", "openai/o3"),
    ("o3-mini", "openai/o3-mini"),
    ("o4-mini", "openai/o4-mini"),
    ("gpt-5", "openai/gpt-5"),
    ("gpt-5-mini", "openai/gpt-5-mini"),
    ("sonnet", "anthropic/claude-sonnet-4"),
    ("claude-sonnet", "anthropic/claude-sonnet-4"),
    ("opus", "anthropic/claude-opus-4"),
    ("claude-opus", "anthropic/claude-opus-4"),
    ("haiku", "anthropic/claude-3.5-haiku"),
    ("claude-haiku", "anthropic/claude-3.5-haiku"),
];

/// Canonical ids the catalog advertises.
const SUPPORTED_MODELS: &[&str] = &[
    "openai/gpt-4o",
    "openai/gpt-4o-mini",
    "openai/gpt-4.1",
    "openai/o1",
    "openai/o3",
    "openai/o3-mini",
    "openai/o4-mini",
    "openai/gpt-5",
    "openai/gpt-5-mini",
    "anthropic/claude-sonnet-4",
    "anthropic/claude-opus-4",
    "anthropic/claude-3.5-haiku",
];

/// Substrings of a model name that mark the reasoning family. These models
/// reject a `temperature` parameter.
const REASONING_MARKERS: &[&str] = &["o1", "o3", "o4", "gpt-5"];

/// Pure lookup table over built-in and configured aliases.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    /// Configured aliases, keys lowercase. Checked before the built-ins.
    extra: HashMap<String, String>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer extra aliases over the built-in table.
    pub fn with_aliases<I, K, V>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (alias, model) in aliases {
            self.extra
                .insert(alias.as_ref().trim().to_ascii_lowercase(), model.into());
        }
        self
    }

    /// Canonical id for `id`. Unknown ids come back trimmed, otherwise as-is.
    pub fn resolve(&self, id: &str) -> String {
        let id = id.trim();
        let key = id.to_ascii_lowercase();
        if let Some(model) = self.extra.get(&key) {
            return model.clone();
        }
        BUILTIN_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map_or_else(|| id.to_string(), |(_, model)| (*model).to_string())
    }

    /// Whether `id` belongs to the reasoning family.
    ///
    /// Only the model name after the last `/` is inspected, so a provider
    /// prefix never triggers a match.
    pub fn is_reasoning_model(&self, id: &str) -> bool {
        let lower = id.trim().to_ascii_lowercase();
        let name = lower.rsplit('/').next().unwrap_or(&lower);
        REASONING_MARKERS.iter().any(|marker| name.contains(marker))
    }

    /// Canonical ids this catalog advertises, including configured targets.
    pub fn supported_models(&self) -> Vec<String> {
        let mut models: Vec<String> = SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect();
        let mut extra: Vec<&String> = self.extra.values().collect();
        extra.sort();
        for model in extra {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
        models
    }

    /// Whether `id` resolves to an advertised model.
    pub fn is_supported(&self, id: &str) -> bool {
        let resolved = self.resolve(id);
        self.supported_models().contains(&resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_shorthand() {
        let catalog = ModelCatalog::new();
        assert_eq!(catalog.resolve("4o"), "openai/gpt-4o");
        assert_eq!(catalog.resolve(" 4O "), "openai/gpt-4o");
        assert_eq!(catalog.resolve("sonnet"), "anthropic/claude-sonnet-4");
    }

    #[test]
    fn unknown_ids_pass_through() {
        let catalog = ModelCatalog::new();
        assert_eq!(catalog.resolve("z-ai/glm-5"), "z-ai/glm-5");
        assert_eq!(catalog.resolve("openai/gpt-4o"), "openai/gpt-4o");
    }

    #[test]
    fn configured_aliases_take_precedence() {
        let catalog = ModelCatalog::new().with_aliases([("4o", "my/gpt-4o-proxy"), ("Fast", "x/y")]);
        assert_eq!(catalog.resolve("4o"), "my/gpt-4o-proxy");
        assert_eq!(catalog.resolve("fast"), "x/y");
        assert!(catalog.supported_models().contains(&"x/y".to_string()));
        assert!(catalog.is_supported("fast"));
    }

    #[test]
    fn reasoning_classification() {
        let catalog = ModelCatalog::new();
        for id in ["openai/o1", "o3-mini", "openai/o4-mini", "openai/gpt-5-mini"] {
            assert!(catalog.is_reasoning_model(id), "{id}");
        }
        for id in ["openai/gpt-4o", "4o", "anthropic/claude-sonnet-4", "z-ai/glm-5"] {
            assert!(!catalog.is_reasoning_model(id), "{id}");
        }
    }

    #[test]
    fn provider_prefix_does_not_mark_reasoning() {
        let catalog = ModelCatalog::new();
        assert!(!catalog.is_reasoning_model("pro1vider/llama-3-70b"));
    }

    #[test]
    fn every_alias_target_is_supported() {
        let catalog = ModelCatalog::new();
        for (alias, target) in BUILTIN_ALIASES {
            assert!(catalog.is_supported(alias), "{alias} -> {target}");
        }
    }
}
