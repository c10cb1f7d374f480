//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.confab/` in
//! production) and deserializes it into [`EngineConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use confab_types::config::EngineConfig;

/// Resolve the data directory: `CONFAB_DATA_DIR` if set, otherwise
/// `~/.confab`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CONFAB_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".confab")
}

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the
///   default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "No config.toml found at {}, using defaults",
                config_path.display()
            );
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!(
                "Failed to read {}: {err}, using defaults",
                config_path.display()
            );
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.gateway.max_retries, 3);
        assert_eq!(config.ledger.page_size, 30);
    }

    #[tokio::test]
    async fn valid_toml_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[gateway]
base_url = "http://inference.internal:9000"
max_retries = 1

[reveal]
chunk_chars = 8
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.gateway.base_url, "http://inference.internal:9000");
        assert_eq!(config.gateway.max_retries, 1);
        assert_eq!(config.gateway.timeout_ms, 30_000, "unset fields keep defaults");
        assert_eq!(config.reveal.chunk_chars, 8);
    }

    #[tokio::test]
    async fn invalid_toml_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.gateway.max_retries, 3);
    }
}
