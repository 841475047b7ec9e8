//! Resolves a `"provider/model"`-prefixed model string to a concrete
//! [`ProviderAdapter`], instantiated from the request's own
//! [`UpstreamCredentials`] (`spec.md` §6: "upstream credentials ... arrive
//! per-request").
//!
//! Grounded on the gateway workspace's `crates/llm/src/server.rs`
//! `resolve_model_route`: split once on `/`, route on the prefix, strip it
//! before calling the provider. Unlike that file, there is no static
//! provider registry or regex pattern table to search — exactly three
//! provider names are recognized and each adapter is built fresh per
//! request from credentials that never touch process configuration.

use canonical::GatewayError;
use config::GatewayConfig;
use providers::{AnthropicAdapter, OllamaAdapter, OpenAiAdapter};

/// The resolved route: a live adapter plus the model name with its provider
/// prefix stripped, ready to hand to [`canonical::ProviderAdapter::chat`].
pub struct ResolvedRoute {
    pub adapter: Box<dyn canonical::ProviderAdapter>,
    pub model: String,
}

/// Splits `requested_model` on its first `/`, builds the matching adapter from
/// `credentials`, and returns the de-prefixed model name. Errors with
/// [`GatewayError::RequestInvalid`] for an unrecognized prefix or a missing
/// credential — both are caller mistakes, not upstream failures.
pub fn resolve(
    requested_model: &str,
    credentials: &canonical::UpstreamCredentials,
    settings: &GatewayConfig,
) -> Result<ResolvedRoute, GatewayError> {
    let Some((provider, model)) = requested_model.split_once('/') else {
        return Err(GatewayError::RequestInvalid(format!(
            "model '{requested_model}' is missing a provider prefix, e.g. 'openai/gpt-4o'"
        )));
    };

    if model.is_empty() {
        return Err(GatewayError::RequestInvalid(format!("model '{requested_model}' has an empty model name")));
    }

    let adapter: Box<dyn canonical::ProviderAdapter> = match provider {
        "openai" => {
            let api_key = credentials
                .openai_api_key
                .clone()
                .ok_or_else(|| GatewayError::RequestInvalid("no OpenAI API key configured for this request".to_owned()))?;
            Box::new(OpenAiAdapter::new(api_key, credentials.openai_base_url.clone()))
        }
        "anthropic" => {
            let api_key = credentials
                .anthropic_api_key
                .clone()
                .ok_or_else(|| GatewayError::RequestInvalid("no Anthropic API key configured for this request".to_owned()))?;
            Box::new(AnthropicAdapter::new(api_key, credentials.anthropic_base_url.clone(), settings.anthropic_max_tokens))
        }
        "ollama" => Box::new(OllamaAdapter::new(credentials.ollama_base_url.clone())),
        other => return Err(GatewayError::RequestInvalid(format!("unknown provider '{other}'"))),
    };

    Ok(ResolvedRoute { adapter, model: model.to_owned() })
}

#[cfg(test)]
mod tests {
    use canonical::UpstreamCredentials;

    use super::*;

    fn settings() -> GatewayConfig {
        GatewayConfig::default()
    }

    #[test]
    fn strips_the_provider_prefix_from_the_model_name() {
        let credentials = UpstreamCredentials { openai_api_key: Some("sk-test".to_owned().into()), ..Default::default() };
        let route = resolve("openai/gpt-4o", &credentials, &settings()).unwrap();
        assert_eq!(route.adapter.name(), "openai");
        assert_eq!(route.model, "gpt-4o");
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let err = resolve("gpt-4o", &UpstreamCredentials::default(), &settings()).unwrap_err();
        assert!(matches!(err, GatewayError::RequestInvalid(_)));
    }

    #[test]
    fn missing_credential_is_rejected() {
        let err = resolve("anthropic/claude-3-5-sonnet", &UpstreamCredentials::default(), &settings()).unwrap_err();
        assert!(matches!(err, GatewayError::RequestInvalid(_)));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = resolve("bedrock/claude", &UpstreamCredentials::default(), &settings()).unwrap_err();
        assert!(matches!(err, GatewayError::RequestInvalid(_)));
    }
}
