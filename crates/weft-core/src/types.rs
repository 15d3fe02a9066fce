use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::execution::TokenUsage;

/// Render a context value the way node outputs are reported: strings verbatim,
/// everything else as JSON.
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Provider credentials keyed by provider name (`openai`, `anthropic`, `tavily`, ...).
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self(map)
    }

    /// Builder-style insert.
    pub fn with(mut self, provider: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(provider, secret);
        self
    }

    pub fn insert(&mut self, provider: impl Into<String>, secret: impl Into<String>) {
        self.0.insert(provider.into(), secret.into());
    }

    /// Secret for a provider. Blank secrets count as absent.
    pub fn get(&self, provider: &str) -> Option<&str> {
        self.0
            .get(provider)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    /// Overlay these credentials on top of `defaults`.
    pub fn merged_over(&self, defaults: &Credentials) -> Credentials {
        let mut merged = defaults.0.clone();
        for (k, v) in &self.0 {
            if !v.trim().is_empty() {
                merged.insert(k.clone(), v.clone());
            }
        }
        Credentials(merged)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.providers().into_iter().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Immutable snapshot of the state threaded through a traversal.
///
/// Each step derives a new snapshot rather than mutating a shared map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionContext {
    values: BTreeMap<String, serde_json::Value>,
}

impl ExecutionContext {
    pub const INPUT: &'static str = "input";
    pub const RESULT: &'static str = "result";

    /// Initial context holding the caller's input.
    pub fn new(input: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            Self::INPUT.to_string(),
            serde_json::Value::String(input.into()),
        );
        Self { values }
    }

    /// A new snapshot with `key` set.
    pub fn with(&self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut values = self.values.clone();
        values.insert(key.into(), value);
        Self { values }
    }

    /// A new snapshot whose `result` is the given node output.
    pub fn with_result(&self, value: serde_json::Value) -> Self {
        self.with(Self::RESULT, value)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn input(&self) -> Option<&serde_json::Value> {
        self.get(Self::INPUT)
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.get(Self::RESULT)
    }

    /// The input as a prompt string (JSON for non-string inputs).
    pub fn input_text(&self) -> String {
        self.input().map(value_to_string).unwrap_or_default()
    }

    /// The latest result as a string (JSON for non-string results).
    pub fn result_text(&self) -> String {
        self.result()
            .map(value_to_string)
            .unwrap_or_else(|| "null".to_string())
    }

    pub fn values(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.values
    }
}

/// One completion call against a language model provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Text and usage returned by a completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Everything a tool executor may read.
#[derive(Debug, Clone)]
pub struct ToolInput {
    pub parameters: serde_json::Value,
    pub context: ExecutionContext,
    pub credentials: Credentials,
}

impl ToolInput {
    /// A string parameter, if present and non-empty.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// A string parameter, falling back to the previous node's result.
    pub fn param_or_result(&self, name: &str) -> String {
        self.param_str(name)
            .map(str::to_string)
            .unwrap_or_else(|| self.context.result_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_snapshots_are_independent() {
        let base = ExecutionContext::new("hello");
        let next = base.with_result(serde_json::json!("world"));
        assert!(base.result().is_none());
        assert_eq!(next.result_text(), "world");
        assert_eq!(next.input_text(), "hello");
    }

    #[test]
    fn test_result_text_stringifies_json() {
        let ctx = ExecutionContext::new("x").with_result(serde_json::json!({"a": 1}));
        assert_eq!(ctx.result_text(), r#"{"a":1}"#);
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::new().with("openai", "sk-secret");
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("openai"));
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn test_credentials_blank_is_absent_and_merge() {
        let defaults = Credentials::new().with("openai", "sk-default").with("tavily", "tv");
        let user = Credentials::new().with("openai", "sk-user").with("tavily", " ");
        let merged = user.merged_over(&defaults);
        assert_eq!(merged.get("openai"), Some("sk-user"));
        assert_eq!(merged.get("tavily"), Some("tv"));
        assert!(Credentials::new().with("x", "").get("x").is_none());
    }

    #[test]
    fn test_tool_input_falls_back_to_result() {
        let input = ToolInput {
            parameters: serde_json::json!({ "query": "" }),
            context: ExecutionContext::new("in").with_result(serde_json::json!("rust")),
            credentials: Credentials::new(),
        };
        assert_eq!(input.param_or_result("query"), "rust");
    }
}
