use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Optional TOML file carrying credentials and option defaults. Flags and
/// environment variables take precedence over anything loaded here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub credentials: CredentialSection,
    #[serde(default)]
    pub options: OptionSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialSection {
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub api_client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionSection {
    /// Run the browser with a visible window.
    pub headed: Option<bool>,
    pub limit: Option<u32>,
    pub deadline_secs: Option<u64>,
}

pub fn load(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}
