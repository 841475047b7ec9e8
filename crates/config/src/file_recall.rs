//! File Recall Manager configuration (`spec.md` §4.3).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileRecallConfig {
    /// Gates the `file_recall_search` tool and the tenant admin routes.
    pub enabled: bool,
    /// Directory root under which `<tenant>/<sha16>.<ext>` documents are stored.
    pub data_dir: String,
    /// Path to the sqlite database holding tenant/document rows.
    pub database_path: String,
    #[serde(with = "duration_secs")]
    pub vector_search_timeout: std::time::Duration,
    /// Extensions accepted by `upload` (`spec.md` §4.3 step 1).
    pub allowed_extensions: Vec<String>,
}

impl Default for FileRecallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_dir: "data/file-recall".to_owned(),
            database_path: "data/file-recall.db".to_owned(),
            vector_search_timeout: std::time::Duration::from_secs(60),
            allowed_extensions: [
                "pdf", "docx", "pptx", "txt", "md", "html", "json", "tex",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::FileRecallConfig;

    #[test]
    fn defaults() {
        let config: FileRecallConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        FileRecallConfig {
            enabled: false,
            data_dir: "data/file-recall",
            database_path: "data/file-recall.db",
            vector_search_timeout: 60s,
            allowed_extensions: [
                "pdf",
                "docx",
                "pptx",
                "txt",
                "md",
                "html",
                "json",
                "tex",
            ],
        }
        "#);
    }
}
