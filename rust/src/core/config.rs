use serde::{Deserialize, Serialize};

/// Server page size for chat history. Must match what the history API
/// actually returns per page or the derived page numbers drift.
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub page_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Reads `gram_config.json` from the data dir; any missing or malformed
/// config falls back to defaults.
pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = std::path::Path::new(data_dir).join("gram_config.json");
    let config = std::fs::read(&path)
        .ok()
        .and_then(|bytes| match serde_json::from_slice::<AppConfig>(&bytes) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed config ignored");
                None
            }
        })
        .unwrap_or_default();
    if config.page_size == 0 {
        tracing::warn!("page_size 0 is invalid, using default");
        return AppConfig::default();
    }
    config
}
