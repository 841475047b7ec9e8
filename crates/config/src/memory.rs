//! Memory Store configuration (`spec.md` §4.4, §6 `MAX_MEMORY_CHARS`).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// `MAX_MEMORY_CHARS` — per-user budget enforced on `create`/`update`.
    pub max_memory_chars: usize,
    pub database_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_memory_chars: 2_000,
            database_path: "data/memory.db".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::MemoryConfig;

    #[test]
    fn defaults() {
        let config: MemoryConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        MemoryConfig {
            enabled: true,
            max_memory_chars: 2000,
            database_path: "data/memory.db",
        }
        "#);
    }
}
