use std::{path::Path, str::FromStr};

use anyhow::bail;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use std::fmt::Write;
use toml::Value;

use crate::Config;

/// Loads `gateway.toml`, expands `{{ env.VAR }}` placeholders, deserializes
/// into [`Config`], then applies the `spec.md` §6 environment-variable
/// overrides that sit outside the TOML file proper (`PORT`, `HOST`,
/// `API_SECRET_KEY`, `ALLOWED_OWUI_INSTANCES`, `DATABASE_PATH`,
/// `MAX_TOOL_ITERATIONS`, …).
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let mut config = Config::deserialize(raw_config)?;
    apply_env_overrides(&mut config)?;
    validate(&config)?;

    Ok(config)
}

/// Applies the environment-variable surface documented in `spec.md` §6. Every
/// variable is optional; when unset the TOML value (or its default) stands.
pub fn apply_env_overrides(config: &mut Config) -> anyhow::Result<()> {
    if let Some(host) = std::env::var("HOST").ok()
        && let Some(port) = std::env::var("PORT").ok()
    {
        config.server.listen_address = Some(format!("{host}:{port}").parse()?);
    }

    if let Ok(secret) = std::env::var("API_SECRET_KEY") {
        config.server.admin_secret = Some(secret.into());
    }

    if let Ok(list) = std::env::var("ALLOWED_OWUI_INSTANCES") {
        config.server.allowed_owui_instances = list.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect();
    }

    if let Ok(path) = std::env::var("DATABASE_PATH") {
        config.metrics.database_path = path;
    }

    if let Ok(value) = std::env::var("MAX_TOOL_ITERATIONS") {
        config.gateway.max_tool_iterations = value.parse()?;
    }

    if let Ok(value) = std::env::var("MAX_INPUT_TOKENS") {
        config.gateway.max_input_tokens = value.parse()?;
    }

    if let Ok(value) = std::env::var("MAX_USER_MESSAGE_TOKENS") {
        config.gateway.max_user_message_tokens = value.parse()?;
    }

    if let Ok(value) = std::env::var("COMPACTION_TOKEN_THRESHOLD") {
        config.gateway.compaction_token_threshold = value.parse()?;
    }

    if let Ok(value) = std::env::var("COMPACTION_MAX_SUMMARY_TOKENS") {
        config.gateway.compaction_max_summary_tokens = value.parse()?;
    }

    if let Ok(value) = std::env::var("MAX_MEMORY_CHARS") {
        config.memory.max_memory_chars = value.parse()?;
    }

    if let Ok(value) = std::env::var("ANTHROPIC_MAX_TOKENS") {
        config.gateway.anthropic_max_tokens = value.parse()?;
    }

    Ok(())
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    if config.gateway.max_tool_iterations == 0 {
        bail!("gateway.max_tool_iterations must be at least 1");
    }

    if config.gateway.compaction_max_summary_tokens == 0 {
        bail!("gateway.compaction_max_summary_tokens must be at least 1");
    }

    if config.file_recall.enabled && config.file_recall.data_dir.is_empty() {
        bail!("file_recall.data_dir must be set when file_recall.enabled is true");
    }

    Ok(())
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path.iter() {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]").unwrap(),
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map.iter_mut() {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn rejects_zero_iteration_cap() {
        let config: Config = toml::from_str(indoc! {r#"
            [gateway]
            max_tool_iterations = 0
        "#})
        .unwrap();

        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_file_recall_without_data_dir() {
        let config: Config = toml::from_str(indoc! {r#"
            [file_recall]
            enabled = true
            data_dir = ""
        "#})
        .unwrap();

        assert!(validate(&config).is_err());
    }

    #[test]
    fn accepts_defaults() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
    }
}
