//! Metrics Recorder configuration (`spec.md` §3 `RequestRecord`/`ToolCallRecord`,
//! §6 `DATABASE_PATH`).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsStoreConfig {
    /// `DATABASE_PATH` — single metrics store file (`spec.md` §6: `data/metrics.<store>`).
    pub database_path: String,
}

impl Default for MetricsStoreConfig {
    fn default() -> Self {
        Self {
            database_path: "data/metrics.sqlite3".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::MetricsStoreConfig;

    #[test]
    fn defaults() {
        let config: MetricsStoreConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        MetricsStoreConfig {
            database_path: "data/metrics.sqlite3",
        }
        "#);
    }
}
