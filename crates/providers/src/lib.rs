//! The three upstream `ProviderAdapter` implementations: OpenAI Responses
//! API, Anthropic Messages API, and an Ollama-compatible chat endpoint.
//!
//! Generalized from the gateway workspace's `crates/llm/src/provider/*`: the
//! Bedrock/Google adapters, the model-alias resolver, and the per-provider
//! header-rewrite layer are dropped along with the static provider registry
//! those files served — this gateway resolves exactly one adapter per
//! request from `canonical::RequestContext::UpstreamCredentials`.

mod anthropic;
mod error_mapping;
mod http_client;
mod ollama;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
