//! Provider configuration — resolved once at startup from the environment.
//!
//! Unlike the teacher's `Config`, this has no on-disk representation: the
//! spec (§6.4) requires the core to persist nothing and run headless purely
//! from environment variables (§6.3). [`ProviderConfig`] is therefore built
//! by [`ProviderConfig::resolve`] and then shared immutably for the lifetime
//! of the process (spec §3: "Created at startup from environment; destroyed
//! at shutdown").

use std::collections::HashMap;

/// Which upstream dialect a provider speaks (spec §3/§6: `endpointKind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// OpenAI-compatible `/v1/chat/completions` — full bidirectional translation.
    OpenAi,
    /// Anthropic-native `/v1/messages` — header rewriting only.
    Anthropic,
}

impl EndpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// The auth header this dialect expects (spec §4.2).
    pub fn auth_header_name(self) -> &'static str {
        match self {
            Self::OpenAi => "Authorization",
            Self::Anthropic => "x-api-key",
        }
    }

    /// Upstream request path suffix appended to `base_url` (spec §4.2).
    pub fn path_suffix(self) -> &'static str {
        match self {
            Self::OpenAi => "/chat/completions",
            Self::Anthropic => "/messages",
        }
    }
}

/// Which upstream model a request should use (spec §3/§4.1: `reasoningModel`,
/// `completionModel`, `valueModel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Reasoning,
    Completion,
    Value,
}

/// A built-in provider — canonical base URL, dialect, and key-env lookup order.
struct BuiltinProvider {
    label: &'static str,
    base_url: &'static str,
    endpoint_kind: EndpointKind,
    key_env: &'static str,
    reasoning_model: &'static str,
    completion_model: &'static str,
    value_model: &'static str,
}

const BUILTIN_PROVIDERS: &[BuiltinProvider] = &[
    BuiltinProvider {
        label: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        endpoint_kind: EndpointKind::OpenAi,
        key_env: "OPENROUTER_API_KEY",
        reasoning_model: "anthropic/claude-opus-4.1",
        completion_model: "anthropic/claude-sonnet-4.5",
        value_model: "anthropic/claude-haiku-4.5",
    },
    BuiltinProvider {
        label: "openai",
        base_url: "https://api.openai.com/v1",
        endpoint_kind: EndpointKind::OpenAi,
        key_env: "OPENAI_API_KEY",
        reasoning_model: "o1",
        completion_model: "gpt-4o",
        value_model: "gpt-4o-mini",
    },
    BuiltinProvider {
        label: "together",
        base_url: "https://api.together.xyz/v1",
        endpoint_kind: EndpointKind::OpenAi,
        key_env: "TOGETHER_API_KEY",
        reasoning_model: "Qwen/Qwen2.5-72B-Instruct-Turbo",
        completion_model: "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        value_model: "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo",
    },
    BuiltinProvider {
        label: "deepseek",
        base_url: "https://api.deepseek.com/anthropic",
        endpoint_kind: EndpointKind::Anthropic,
        key_env: "DEEPSEEK_API_KEY",
        reasoning_model: "deepseek-reasoner",
        completion_model: "deepseek-chat",
        value_model: "deepseek-chat",
    },
    BuiltinProvider {
        label: "glm",
        base_url: "https://open.bigmodel.cn/api/anthropic",
        endpoint_kind: EndpointKind::Anthropic,
        key_env: "GLM_API_KEY",
        reasoning_model: "glm-4.6",
        completion_model: "glm-4.6",
        value_model: "glm-4-flash",
    },
];

fn builtin(label: &str) -> &'static BuiltinProvider {
    BUILTIN_PROVIDERS
        .iter()
        .find(|p| p.label.eq_ignore_ascii_case(label))
        .unwrap_or(&BUILTIN_PROVIDERS[0])
}

/// Process-wide, immutable provider configuration (spec §3 `ProviderConfig`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub endpoint_kind: EndpointKind,
    pub provider_label: String,
    pub api_key: String,
    pub extra_headers: HashMap<String, String>,
    pub reasoning_model: String,
    pub completion_model: String,
    pub value_model: String,
    pub debug: bool,
    /// `anthropic-version` sent on Anthropic-native upstream calls.
    pub anthropic_version: String,
    /// Optional `anthropic-beta` header, Anthropic-native only.
    pub anthropic_beta: Option<String>,
    /// Diagnostic-only toggle; no XML tool-calling path is implemented (spec
    /// §9 Open Questions — explicitly left optional).
    pub force_xml_tools: bool,
    /// Listen port (spec §6.3 `PORT`, default 3000).
    pub port: u16,
}

impl ProviderConfig {
    /// Resolve configuration purely from environment variables (spec §4.6).
    ///
    /// This never fails outright — an empty `api_key` is tolerated so the
    /// server can still start and answer `/health`; every other request then
    /// fails fast with a [`crate::error::ProxyError::Config`] (spec §3
    /// invariant, §8 boundary behavior "Missing API key → 400 `config`").
    pub fn resolve() -> Self {
        let debug = truthy_env("DEBUG");
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::port());

        let (base_url, endpoint_kind, provider_label, builtin_key_env) =
            match std::env::var("ANTHROPIC_PROXY_BASE_URL").ok().filter(|v| !v.is_empty()) {
                Some(custom_url) => {
                    let kind_override = std::env::var("CUSTOM_ENDPOINT_KIND").unwrap_or_default();
                    let endpoint_kind = match kind_override.as_str() {
                        "openai" => EndpointKind::OpenAi,
                        "anthropic" => EndpointKind::Anthropic,
                        _ => infer_endpoint_kind(&custom_url),
                    };
                    let label = std::env::var("ANTHROPIC_PROXY_PROVIDER")
                        .unwrap_or_else(|_| "custom".to_string());
                    (custom_url, endpoint_kind, label, None)
                }
                None => {
                    let label = std::env::var("ANTHROPIC_PROXY_PROVIDER")
                        .unwrap_or_else(|_| "openrouter".to_string());
                    let provider = builtin(&label);
                    (
                        provider.base_url.to_string(),
                        provider.endpoint_kind,
                        provider.label.to_string(),
                        Some(provider.key_env),
                    )
                }
            };

        let api_key = resolve_api_key(&provider_label, builtin_key_env);

        let reference = builtin(&provider_label);
        let reasoning_model = std::env::var("REASONING_MODEL")
            .unwrap_or_else(|_| reference.reasoning_model.to_string());
        let completion_model = std::env::var("COMPLETION_MODEL")
            .unwrap_or_else(|_| reference.completion_model.to_string());
        let value_model = std::env::var("VALUE_MODEL")
            .unwrap_or_else(|_| reference.value_model.to_string());

        let mut extra_headers = HashMap::new();
        if provider_label.eq_ignore_ascii_case("openrouter") {
            if let Ok(site) = std::env::var("OPENROUTER_SITE_URL") {
                if !site.is_empty() {
                    extra_headers.insert("HTTP-Referer".to_string(), site);
                }
            }
            if let Ok(title) = std::env::var("OPENROUTER_APP_TITLE") {
                if !title.is_empty() {
                    extra_headers.insert("X-Title".to_string(), title);
                }
            }
        }

        let anthropic_version = std::env::var("ANTHROPIC_VERSION")
            .unwrap_or_else(|_| defaults::anthropic_version().to_string());
        let anthropic_beta = std::env::var("ANTHROPIC_BETA").ok().filter(|v| !v.is_empty());
        if endpoint_kind == EndpointKind::Anthropic {
            extra_headers.insert("anthropic-version".to_string(), anthropic_version.clone());
            if let Some(beta) = &anthropic_beta {
                extra_headers.insert("anthropic-beta".to_string(), beta.clone());
            }
        }

        let force_xml_tools = truthy_env("FORCE_XML_TOOLS");

        let config = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoint_kind,
            provider_label,
            api_key,
            extra_headers,
            reasoning_model,
            completion_model,
            value_model,
            debug,
            anthropic_version,
            anthropic_beta,
            force_xml_tools,
            port,
        };

        // Single structured startup line — never the key value itself (spec §4.6).
        tracing::info!(
            provider = %config.provider_label,
            endpoint_kind = config.endpoint_kind.as_str(),
            reasoning_model = %config.reasoning_model,
            completion_model = %config.completion_model,
            value_model = %config.value_model,
            has_key = !config.api_key.is_empty(),
            "resolved provider configuration"
        );

        config
    }

    /// Resolve a client-supplied model alias to a role (spec §4.1: "If the
    /// client supplied an explicit `model` that matches a recognized alias").
    pub fn role_for_alias(model: &str) -> Option<ModelRole> {
        match model {
            "opus" => Some(ModelRole::Reasoning),
            "sonnet" | "haiku" => Some(ModelRole::Completion),
            "value" => Some(ModelRole::Value),
            _ => None,
        }
    }

    /// Select the upstream model name for a given role (spec §4.1).
    pub fn model_for_role(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Reasoning => &self.reasoning_model,
            ModelRole::Completion => &self.completion_model,
            ModelRole::Value => &self.value_model,
        }
    }

    /// Full upstream URL for chat/messages calls (spec §4.2).
    pub fn upstream_url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoint_kind.path_suffix())
    }
}

fn infer_endpoint_kind(base_url: &str) -> EndpointKind {
    let path = base_url.trim_end_matches('/');
    if path.ends_with("/anthropic") {
        EndpointKind::Anthropic
    } else {
        EndpointKind::OpenAi
    }
}

/// Key selection order (spec §4.6 point 3): explicit custom key → generic
/// `API_KEY` → provider-specific env var → fallback to `OPENROUTER_API_KEY`.
fn resolve_api_key(provider_label: &str, builtin_key_env: Option<&str>) -> String {
    if let Ok(key) = std::env::var("CUSTOM_API_KEY") {
        if !key.is_empty() {
            return key;
        }
    }
    if let Ok(key) = std::env::var("API_KEY") {
        if !key.is_empty() {
            return key;
        }
    }
    // ZAI_API_KEY is an accepted alias for GLM_API_KEY (spec §6.3).
    if provider_label.eq_ignore_ascii_case("glm") {
        if let Ok(key) = std::env::var("GLM_API_KEY") {
            if !key.is_empty() {
                return key;
            }
        }
        if let Ok(key) = std::env::var("ZAI_API_KEY") {
            if !key.is_empty() {
                return key;
            }
        }
    } else if let Some(env_var) = builtin_key_env {
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                return key;
            }
        }
    }
    std::env::var("OPENROUTER_API_KEY").unwrap_or_default()
}

fn truthy_env(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

mod defaults {
    pub fn port() -> u16 {
        3000
    }
    pub fn anthropic_version() -> &'static str {
        "2023-06-01"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable mutation races across tests in the same process;
    // each test clears the full var set before and after to stay independent,
    // mirroring the teacher's env-isolation convention in `backends/mod.rs`.

    fn clear_all_provider_env() {
        for var in [
            "ANTHROPIC_PROXY_BASE_URL",
            "ANTHROPIC_PROXY_PROVIDER",
            "CUSTOM_ENDPOINT_KIND",
            "CUSTOM_API_KEY",
            "API_KEY",
            "OPENROUTER_API_KEY",
            "OPENAI_API_KEY",
            "TOGETHER_API_KEY",
            "DEEPSEEK_API_KEY",
            "GLM_API_KEY",
            "ZAI_API_KEY",
            "REASONING_MODEL",
            "COMPLETION_MODEL",
            "VALUE_MODEL",
            "DEBUG",
            "PORT",
            "FORCE_XML_TOOLS",
            "ANTHROPIC_VERSION",
            "ANTHROPIC_BETA",
            "OPENROUTER_SITE_URL",
            "OPENROUTER_APP_TITLE",
        ] {
            // SAFETY: these tests are expected to run with `--test-threads=1`
            // (see Cargo.toml note); env mutation is not otherwise safe to race.
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn defaults_to_openrouter_with_no_env() {
        clear_all_provider_env();
        let cfg = ProviderConfig::resolve();
        assert_eq!(cfg.provider_label, "openrouter");
        assert_eq!(cfg.endpoint_kind, EndpointKind::OpenAi);
        assert_eq!(cfg.base_url, "https://openrouter.ai/api/v1");
        assert!(cfg.api_key.is_empty());
    }

    #[test]
    fn custom_base_url_infers_anthropic_from_path_suffix() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("ANTHROPIC_PROXY_BASE_URL", "https://example.com/anthropic");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(cfg.endpoint_kind, EndpointKind::Anthropic);
        unsafe { std::env::remove_var("ANTHROPIC_PROXY_BASE_URL") };
    }

    #[test]
    fn custom_base_url_defaults_to_openai_without_anthropic_suffix() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("ANTHROPIC_PROXY_BASE_URL", "https://example.com/v1");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(cfg.endpoint_kind, EndpointKind::OpenAi);
        unsafe { std::env::remove_var("ANTHROPIC_PROXY_BASE_URL") };
    }

    #[test]
    fn custom_endpoint_kind_overrides_inference() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("ANTHROPIC_PROXY_BASE_URL", "https://example.com/v1");
            std::env::set_var("CUSTOM_ENDPOINT_KIND", "anthropic");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(cfg.endpoint_kind, EndpointKind::Anthropic);
        clear_all_provider_env();
    }

    #[test]
    fn custom_api_key_takes_priority_over_everything() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("CUSTOM_API_KEY", "sk-custom");
            std::env::set_var("OPENROUTER_API_KEY", "sk-openrouter");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(cfg.api_key, "sk-custom");
        clear_all_provider_env();
    }

    #[test]
    fn falls_back_to_openrouter_key_when_nothing_else_matches() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("ANTHROPIC_PROXY_PROVIDER", "together");
            std::env::set_var("OPENROUTER_API_KEY", "sk-fallback");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(cfg.api_key, "sk-fallback");
        clear_all_provider_env();
    }

    #[test]
    fn glm_accepts_zai_api_key_alias() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("ANTHROPIC_PROXY_PROVIDER", "glm");
            std::env::set_var("ZAI_API_KEY", "sk-zai");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(cfg.api_key, "sk-zai");
        assert_eq!(cfg.endpoint_kind, EndpointKind::Anthropic);
        clear_all_provider_env();
    }

    #[test]
    fn role_for_alias_maps_known_names() {
        assert_eq!(ProviderConfig::role_for_alias("opus"), Some(ModelRole::Reasoning));
        assert_eq!(ProviderConfig::role_for_alias("sonnet"), Some(ModelRole::Completion));
        assert_eq!(ProviderConfig::role_for_alias("haiku"), Some(ModelRole::Completion));
        assert_eq!(ProviderConfig::role_for_alias("value"), Some(ModelRole::Value));
        assert_eq!(ProviderConfig::role_for_alias("claude-3-opus-20240229"), None);
    }

    #[test]
    fn openrouter_extra_headers_only_attached_for_openrouter() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("OPENROUTER_SITE_URL", "https://example.dev");
            std::env::set_var("OPENROUTER_APP_TITLE", "My App");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(
            cfg.extra_headers.get("HTTP-Referer").map(String::as_str),
            Some("https://example.dev")
        );
        assert_eq!(cfg.extra_headers.get("X-Title").map(String::as_str), Some("My App"));
        clear_all_provider_env();
    }

    #[test]
    fn anthropic_native_attaches_version_header() {
        clear_all_provider_env();
        unsafe {
            std::env::set_var("ANTHROPIC_PROXY_PROVIDER", "deepseek");
        }
        let cfg = ProviderConfig::resolve();
        assert_eq!(
            cfg.extra_headers.get("anthropic-version").map(String::as_str),
            Some("2023-06-01")
        );
        clear_all_provider_env();
    }
}
