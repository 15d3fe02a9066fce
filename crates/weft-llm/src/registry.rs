use weft_core::error::{Result, WeftError};

/// Provider family. Each family has one wire protocol and one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

/// Static description of a model provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    /// Name used in error messages ("OpenAI API key is required ...").
    pub display_name: &'static str,
    /// Key looked up in the caller's credentials.
    pub credential_key: &'static str,
    pub model_prefixes: &'static [&'static str],
    pub default_base_url: &'static str,
}

impl ProviderDescriptor {
    pub fn serves(&self, model: &str) -> bool {
        self.model_prefixes.iter().any(|p| model.starts_with(p))
    }
}

pub const OPENAI: ProviderDescriptor = ProviderDescriptor {
    kind: ProviderKind::OpenAi,
    display_name: "OpenAI",
    credential_key: "openai",
    model_prefixes: &["gpt-", "o1", "o3", "o4"],
    default_base_url: "https://api.openai.com/v1/chat/completions",
};

pub const ANTHROPIC: ProviderDescriptor = ProviderDescriptor {
    kind: ProviderKind::Anthropic,
    display_name: "Anthropic",
    credential_key: "anthropic",
    model_prefixes: &["claude-"],
    default_base_url: "https://api.anthropic.com/v1/messages",
};

/// Maps model identifiers to providers by prefix. First registered match wins.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the OpenAI and Anthropic families.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(OPENAI);
        registry.register(ANTHROPIC);
        registry
    }

    pub fn register(&mut self, descriptor: ProviderDescriptor) {
        self.providers.push(descriptor);
    }

    /// Find the provider serving `model`.
    pub fn resolve(&self, model: &str) -> Result<&ProviderDescriptor> {
        self.providers
            .iter()
            .find(|p| p.serves(model))
            .ok_or_else(|| WeftError::UnsupportedModel(model.to_string()))
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.providers
    }
}
