use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::{BackendKind, ProviderKind};

pub const CONFIG_FILE: &str = "prompt-studio.yaml";
pub const ENV_SERVER: &str = "PROMPT_STUDIO_SERVER";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: String,
    pub root: String,
    /// Presets, settings and templates for the local backend, relative to `root`.
    pub data_dir: String,
    pub server_url: String,
    pub backend: BackendKind,
    pub provider: ProviderKind,
    /// Overrides the stored model for the direct provider.
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub save_transcript: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: "2025-11-01".into(),
            root: ".".into(),
            data_dir: ".prompt-studio/data".into(),
            server_url: "http://localhost:5000".into(),
            backend: BackendKind::Http,
            provider: ProviderKind::Server,
            model: None,
            timeout_secs: 120,
            save_transcript: false,
        }
    }
}

impl Config {
    /// Read `path`, or `<root>/prompt-studio.yaml` when present, else defaults.
    pub fn load(path: Option<&Path>, root: &str) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let p = Path::new(root).join(CONFIG_FILE);
                p.exists().then_some(p)
            }
        };
        let mut cfg = match candidate {
            Some(p) => {
                let text = fs::read_to_string(&p)?;
                serde_yaml::from_str::<Config>(&text).with_context(|| format!("parsing {}", p.display()))?
            }
            None => Config::default(),
        };
        cfg.root = root.to_string();
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_SERVER).filter(|s| !s.trim().is_empty()) {
            self.server_url = url.trim().to_string();
        }
    }

    pub fn data_path(&self) -> PathBuf {
        Path::new(&self.root).join(&self.data_dir)
    }
}
