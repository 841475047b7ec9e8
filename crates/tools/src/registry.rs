//! The Tool Registry (`spec.md` §4.1): the provider-agnostic tool catalog.
//!
//! Argument validation uses the `jsonschema` crate, compiled once per tool
//! definition at construction time and cached for the process lifetime —
//! matching the registry's "immutable within a process lifetime" invariant.
//! Per-provider rendering (the two OpenAI tool-call shapes, the Ollama
//! legacy shape, `additionalProperties: false` under strict mode) lives in
//! each `crates/providers` adapter, which already receives the filtered
//! `&[ToolDefinition]` this registry produces — see `DESIGN.md`.

use std::collections::HashMap;

use canonical::{RequestContext, ToolDefinition};
use jsonschema::Validator;

use crate::{
    builtin::{self, ToolCategory},
    error::ToolError,
};

pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    categories: HashMap<String, ToolCategory>,
    validators: HashMap<String, Validator>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let entries = builtin::catalog();
        let mut definitions = Vec::with_capacity(entries.len());
        let mut categories = HashMap::with_capacity(entries.len());
        let mut validators = HashMap::with_capacity(entries.len());

        for entry in entries {
            let validator = jsonschema::validator_for(&entry.definition.parameters)
                .unwrap_or_else(|e| panic!("built-in schema for '{}' does not compile: {e}", entry.definition.name));

            categories.insert(entry.definition.name.clone(), entry.category);
            validators.insert(entry.definition.name.clone(), validator);
            definitions.push(entry.definition);
        }

        Self { definitions, categories, validators }
    }

    /// `listEnabled(requestConfig)` (`spec.md` §4.1). Returns the tool
    /// definitions available for this request, applying the gating rules:
    /// web/image tools require their upstream credential to be configured on
    /// the request, sandbox tools require the sandbox flag, file recall
    /// requires both the flag and a tenant id, memory/date-time have no
    /// external dependency beyond their own request flag.
    pub fn list_enabled(&self, ctx: &RequestContext) -> Vec<ToolDefinition> {
        let config = &ctx.tools_config;

        self.definitions
            .iter()
            .filter(|definition| {
                let Some(category) = self.categories.get(&definition.name) else {
                    return false;
                };

                match category {
                    ToolCategory::DateTime => config.date_time,
                    ToolCategory::Memory => config.memory,
                    ToolCategory::Sandbox => config.sandbox,
                    ToolCategory::FileRecall => config.file_recall && ctx.tenant_id.as_deref().is_some_and(|id| !id.is_empty()),
                    ToolCategory::WebSearch => config.web_search && config.search_api_key.is_some(),
                    ToolCategory::ImageGeneration => config.image_generation && config.image_backend_base_url.is_some(),
                }
            })
            .cloned()
            .collect()
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    fn is_enabled(&self, name: &str, ctx: &RequestContext) -> bool {
        self.list_enabled(ctx).iter().any(|d| d.name == name)
    }

    /// Resolves and validates a tool call per `spec.md` §3 `ToolCall`
    /// validation and §4.5 steps 1-2: unknown names and disabled tools are
    /// rejected before schema validation runs.
    pub fn validate_call(&self, name: &str, arguments: &serde_json::Value, ctx: &RequestContext) -> Result<(), ToolError> {
        let Some(validator) = self.validators.get(name) else {
            return Err(ToolError::UnknownTool(name.to_owned()));
        };

        if !self.is_enabled(name, ctx) {
            return Err(ToolError::NotEnabled(name.to_owned()));
        }

        let errors: Vec<String> = validator.iter_errors(arguments).map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            return Err(ToolError::ArgumentInvalid { tool: name.to_owned(), message: errors.join("; ") });
        }

        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use canonical::ToolsConfig;
    use serde_json::json;

    use super::*;

    fn ctx_with(tools_config: ToolsConfig) -> RequestContext {
        RequestContext { tools_config, ..Default::default() }
    }

    #[test]
    fn schema_round_trip_preserves_name_description_parameters() {
        let registry = ToolRegistry::new();

        for definition in &registry.definitions {
            let rebuilt = registry.definition(&definition.name).unwrap();
            assert_eq!(rebuilt.name, definition.name);
            assert_eq!(rebuilt.description, definition.description);
            assert_eq!(rebuilt.parameters, definition.parameters);
        }
    }

    #[test]
    fn sandbox_tools_are_gated_on_the_sandbox_flag() {
        let registry = ToolRegistry::new();

        let disabled = ctx_with(ToolsConfig::default());
        assert!(!registry.list_enabled(&disabled).iter().any(|d| d.name == "sandbox_execute"));

        let enabled = ctx_with(ToolsConfig { sandbox: true, ..Default::default() });
        assert!(registry.list_enabled(&enabled).iter().any(|d| d.name == "sandbox_execute"));
    }

    #[test]
    fn web_search_requires_both_the_flag_and_a_search_api_key() {
        let registry = ToolRegistry::new();

        let flag_only = ctx_with(ToolsConfig { web_search: true, ..Default::default() });
        assert!(!registry.list_enabled(&flag_only).iter().any(|d| d.name == "web_search"));

        let both = ctx_with(ToolsConfig { web_search: true, search_api_key: Some("key".to_owned().into()), ..Default::default() });
        assert!(registry.list_enabled(&both).iter().any(|d| d.name == "web_search"));
    }

    #[test]
    fn file_recall_requires_a_non_empty_tenant_id() {
        let registry = ToolRegistry::new();
        let config = ToolsConfig { file_recall: true, ..Default::default() };

        let no_tenant = RequestContext { tools_config: config.clone(), ..Default::default() };
        assert!(!registry.list_enabled(&no_tenant).iter().any(|d| d.name == "file_recall_search"));

        let with_tenant = RequestContext { tools_config: config, tenant_id: Some("t1".to_owned()), ..Default::default() };
        assert!(registry.list_enabled(&with_tenant).iter().any(|d| d.name == "file_recall_search"));
    }

    #[test]
    fn unknown_tool_is_rejected_before_schema_validation() {
        let registry = ToolRegistry::new();
        let ctx = ctx_with(ToolsConfig::default());

        let err = registry.validate_call("not_a_real_tool", &json!({}), &ctx).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn disabled_tool_is_rejected_even_if_arguments_are_valid() {
        let registry = ToolRegistry::new();
        let ctx = ctx_with(ToolsConfig::default());

        let err = registry.validate_call("sandbox_execute", &json!({"command": "echo hi"}), &ctx).unwrap_err();
        assert!(matches!(err, ToolError::NotEnabled(_)));
    }

    #[test]
    fn invalid_arguments_are_reported_rather_than_panicking() {
        let registry = ToolRegistry::new();
        let ctx = ctx_with(ToolsConfig { memory: true, ..Default::default() });

        let err = registry.validate_call("memory_create", &json!({}), &ctx).unwrap_err();
        assert!(matches!(err, ToolError::ArgumentInvalid { .. }));
    }
}
