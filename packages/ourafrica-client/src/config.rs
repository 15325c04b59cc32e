use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_DATA_DIR: &str = ".ourafrica";

/// Client configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    /// Directory holding the token store and local database files
    pub data_dir: PathBuf,
    /// Start without network access
    pub offline: bool,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("OURAFRICA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        reqwest::Url::parse(&api_url).context("OURAFRICA_API_URL must be a valid URL")?;

        Ok(Self {
            api_url,
            data_dir: lookup("OURAFRICA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            offline: match lookup("OURAFRICA_OFFLINE") {
                Some(raw) => parse_bool(&raw).context("OURAFRICA_OFFLINE must be true or false")?,
                None => false,
            },
        })
    }

    pub fn token_store_path(&self) -> PathBuf {
        self.data_dir.join("tokens.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("local.json")
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            offline: false,
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("unrecognized boolean {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(load(&[]).unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("OURAFRICA_API_URL", "https://api.ourafrica.test"),
            ("OURAFRICA_DATA_DIR", "/tmp/oa"),
            ("OURAFRICA_OFFLINE", "Yes"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "https://api.ourafrica.test");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/oa/local.json"));
        assert!(config.offline);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(load(&[("OURAFRICA_API_URL", "not a url")]).is_err());
        assert!(load(&[("OURAFRICA_OFFLINE", "maybe")]).is_err());
    }
}
