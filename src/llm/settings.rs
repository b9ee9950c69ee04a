//! Model tuning parameters

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output verbosity hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    Medium,
    High,
}

impl Verbosity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Verbosity::Low),
            "medium" => Some(Verbosity::Medium),
            "high" => Some(Verbosity::High),
            _ => None,
        }
    }
}

/// Reasoning parameters for reasoning-capable models
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
}

/// Optional settings; unset fields fall back to the model's defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_query: HashMap<String, String>,
}

impl ModelSettings {
    /// Overlay `overrides` on top of these settings; set fields in
    /// `overrides` win, maps are merged key by key
    pub fn resolve(&self, overrides: Option<&ModelSettings>) -> ModelSettings {
        let Some(o) = overrides else {
            return self.clone();
        };
        let mut merged = self.clone();
        if o.temperature.is_some() {
            merged.temperature = o.temperature;
        }
        if o.top_p.is_some() {
            merged.top_p = o.top_p;
        }
        if o.max_tokens.is_some() {
            merged.max_tokens = o.max_tokens;
        }
        if o.tool_choice.is_some() {
            merged.tool_choice = o.tool_choice.clone();
        }
        if o.parallel_tool_calls.is_some() {
            merged.parallel_tool_calls = o.parallel_tool_calls;
        }
        if o.truncation.is_some() {
            merged.truncation = o.truncation.clone();
        }
        if o.reasoning.is_some() {
            merged.reasoning = o.reasoning.clone();
        }
        if o.verbosity.is_some() {
            merged.verbosity = o.verbosity;
        }
        merged.metadata.extend(o.metadata.clone());
        merged.extra_headers.extend(o.extra_headers.clone());
        merged.extra_query.extend(o.extra_query.clone());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_overrides() {
        let base = ModelSettings {
            temperature: Some(0.2),
            top_p: Some(0.9),
            metadata: HashMap::from([("a".to_string(), "1".to_string())]),
            ..Default::default()
        };
        let overrides = ModelSettings {
            temperature: Some(0.7),
            metadata: HashMap::from([("b".to_string(), "2".to_string())]),
            ..Default::default()
        };

        let merged = base.resolve(Some(&overrides));
        assert_eq!(merged.temperature, Some(0.7));
        assert_eq!(merged.top_p, Some(0.9));
        assert_eq!(merged.metadata.len(), 2);
        assert_eq!(base.resolve(None), base);
    }

    #[test]
    fn test_verbosity_parse() {
        assert_eq!(Verbosity::parse("HIGH"), Some(Verbosity::High));
        assert_eq!(Verbosity::parse("loud"), None);
    }
}
