//! Known generation services and the environment-driven priority chain.
//!
//! | Provider | Key | Model override | Default model |
//! |----------|-----|----------------|---------------|
//! | Mistral | `MISTRAL_API_KEY` | `MISTRAL_MODEL` | mistral-small-latest |
//! | DeepSeek | `DEEPSEEK_API_KEY` | `DEEPSEEK_MODEL` | deepseek-chat |
//! | Z.AI | `ZAI_API_KEY` | `ZAI_MODEL` (+ `ZAI_BASE_URL`) | glm-4 |
//! | Gemini | `GEMINI_API_KEY` | `GEMINI_MODEL` | gemini-2.0-flash |
//! | OpenAI | `OPENAI_API_KEY` | `OPENAI_MODEL` | gpt-4o |
//! | Anthropic | `ANTHROPIC_API_KEY` | `ANTHROPIC_MODEL` | claude-sonnet-4-20250514 |
//! | Groq | `GROQ_API_KEY` | `GROQ_MODEL` | llama-3.3-70b-versatile |
//! | Together | `TOGETHER_API_KEY` | `TOGETHER_MODEL` | meta-llama/Llama-3.3-70B-Instruct-Turbo |
//! | OpenRouter | `OPENROUTER_API_KEY` | `OPENROUTER_MODEL` | anthropic/claude-3.5-sonnet |
//!
//! The chain is tried in table order. The built-in default provider is not
//! part of this table; it is always tried last.

use serde::{Deserialize, Serialize};

/// Display name of the always-available default provider.
pub const BUILTIN_PROVIDER_NAME: &str = "Built-in (OpenAI-compatible)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mistral,
    DeepSeek,
    Zai,
    Gemini,
    OpenAi,
    Anthropic,
    Groq,
    Together,
    OpenRouter,
}

/// Request/response shape spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `POST /chat/completions` with `choices[0].message.content`.
    OpenAiChat,
    /// Anthropic messages API: separate `system`, `content[0].text`.
    AnthropicMessages,
    /// Gemini `generateContent`: `candidates[0].content.parts[0].text`.
    GeminiGenerate,
}

impl ProviderKind {
    /// Fixed fallback order.
    pub const PRIORITY: [ProviderKind; 9] = [
        ProviderKind::Mistral,
        ProviderKind::DeepSeek,
        ProviderKind::Zai,
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Groq,
        ProviderKind::Together,
        ProviderKind::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mistral => "mistral",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Zai => "zai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Groq => "groq",
            ProviderKind::Together => "together",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Mistral => "Mistral AI",
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::Zai => "Z.AI (GLM-4)",
            ProviderKind::Gemini => "Google Gemini",
            ProviderKind::OpenAi => "OpenAI GPT",
            ProviderKind::Anthropic => "Anthropic Claude",
            ProviderKind::Groq => "Groq (LLaMA)",
            ProviderKind::Together => "Together AI",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    /// Environment variable prefix: `<PREFIX>_API_KEY`, `<PREFIX>_MODEL`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderKind::Mistral => "MISTRAL",
            ProviderKind::DeepSeek => "DEEPSEEK",
            ProviderKind::Zai => "ZAI",
            ProviderKind::Gemini => "GEMINI",
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::Anthropic => "ANTHROPIC",
            ProviderKind::Groq => "GROQ",
            ProviderKind::Together => "TOGETHER",
            ProviderKind::OpenRouter => "OPENROUTER",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Mistral => "mistral-small-latest",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Zai => "glm-4",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::Together => "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            ProviderKind::OpenRouter => "anthropic/claude-3.5-sonnet",
        }
    }

    /// Default endpoint. Gemini's is a base that gets `{model}:generateContent` appended.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Mistral => "https://api.mistral.ai/v1/chat/completions",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            ProviderKind::Zai => "https://open.bigmodel.cn/api/paas/v4/chat/completions",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta/models",
            ProviderKind::OpenAi => "https://api.openai.com/v1/chat/completions",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1/messages",
            ProviderKind::Groq => "https://api.groq.com/openai/v1/chat/completions",
            ProviderKind::Together => "https://api.together.xyz/v1/chat/completions",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            ProviderKind::Anthropic => WireFormat::AnthropicMessages,
            ProviderKind::Gemini => WireFormat::GeminiGenerate,
            _ => WireFormat::OpenAiChat,
        }
    }

    pub fn tier(&self) -> &'static str {
        match self {
            ProviderKind::Mistral | ProviderKind::Zai | ProviderKind::Gemini => "Free Tier Available",
            ProviderKind::DeepSeek => "Free credit",
            ProviderKind::OpenAi | ProviderKind::Anthropic => "Premium",
            ProviderKind::Groq => "Fast & Free Tier",
            ProviderKind::Together => "Pay-per-use",
            ProviderKind::OpenRouter => "100+ Models",
        }
    }

    pub fn website(&self) -> &'static str {
        match self {
            ProviderKind::Mistral => "https://console.mistral.ai",
            ProviderKind::DeepSeek => "https://platform.deepseek.com",
            ProviderKind::Zai => "https://open.bigmodel.cn",
            ProviderKind::Gemini => "https://aistudio.google.com",
            ProviderKind::OpenAi => "https://platform.openai.com",
            ProviderKind::Anthropic => "https://console.anthropic.com",
            ProviderKind::Groq => "https://console.groq.com",
            ProviderKind::Together => "https://api.together.xyz",
            ProviderKind::OpenRouter => "https://openrouter.ai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::PRIORITY.into_iter().find(|k| k.as_str() == s)
    }
}

/// A provider the operator has enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderSpec {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            model: kind.default_model().to_string(),
            base_url: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.kind.default_endpoint());
        match self.kind.wire_format() {
            WireFormat::GeminiGenerate => format!("{}/{}:generateContent", base.trim_end_matches('/'), self.model),
            _ => base.to_string(),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Enabled providers in priority order, reading variables through `lookup`.
pub fn chain_from_lookup<F>(lookup: F) -> Vec<ProviderSpec>
where
    F: Fn(&str) -> Option<String>,
{
    ProviderKind::PRIORITY
        .into_iter()
        .filter_map(|kind| {
            let prefix = kind.env_prefix();
            let api_key = non_empty(lookup(&format!("{}_API_KEY", prefix)))?;
            let model = non_empty(lookup(&format!("{}_MODEL", prefix)))
                .unwrap_or_else(|| kind.default_model().to_string());
            let base_url = match kind {
                ProviderKind::Zai => non_empty(lookup("ZAI_BASE_URL")),
                _ => None,
            };
            Some(ProviderSpec {
                kind,
                api_key,
                model,
                base_url,
            })
        })
        .collect()
}

pub fn chain_from_env() -> Vec<ProviderSpec> {
    chain_from_lookup(|k| std::env::var(k).ok())
}

/// Name of the provider that would be tried first.
pub fn configured_provider_name(chain: &[ProviderSpec]) -> &'static str {
    chain
        .first()
        .map(|s| s.kind.display_name())
        .unwrap_or(BUILTIN_PROVIDER_NAME)
}

/// One row of the supported-provider listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedProvider {
    pub name: &'static str,
    pub env_key: String,
    pub default_model: &'static str,
    pub tier: &'static str,
    pub website: &'static str,
}

pub fn supported_providers() -> Vec<SupportedProvider> {
    ProviderKind::PRIORITY
        .into_iter()
        .map(|k| SupportedProvider {
            name: k.display_name(),
            env_key: format!("{}_API_KEY", k.env_prefix()),
            default_model: k.default_model(),
            tier: k.tier(),
            website: k.website(),
        })
        .collect()
}
