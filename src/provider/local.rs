use async_trait::async_trait;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{ConfigStore, LineArtTemplates, OptionsSource, PresetStore};
use crate::document::{canonicalize, Document};
use crate::errors::StudioError;
use crate::wire::{OptionsCatalog, Preset, PresetSummary, Settings, SettingsUpdate};

pub const DEFAULT_LINE_ART_TEMPLATE: &str =
    "黑白线稿风格，干净利落的线条，无阴影无上色，纯白背景，保留主体轮廓与关键细节";

/// Settings file contents, secrets included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub gemini_base_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-5.1".into(),
            gemini_base_url: String::new(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-3-pro-image-preview".into(),
        }
    }
}

impl StoredSettings {
    fn merge(&mut self, update: &SettingsUpdate) {
        let fields = [
            (&mut self.base_url, &update.base_url),
            (&mut self.api_key, &update.api_key),
            (&mut self.model, &update.model),
            (&mut self.gemini_base_url, &update.gemini_base_url),
            (&mut self.gemini_api_key, &update.gemini_api_key),
            (&mut self.gemini_model, &update.gemini_model),
        ];
        for (slot, value) in fields {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
    }

    pub fn public(&self) -> Settings {
        Settings {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            gemini_base_url: self.gemini_base_url.clone(),
            gemini_model: self.gemini_model.clone(),
            has_api_key: !self.api_key.is_empty(),
            has_gemini_api_key: !self.gemini_api_key.is_empty(),
        }
    }
}

/// File-backed collaborators rooted at one data directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn presets_dir(&self) -> PathBuf {
        self.root.join("presets")
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join("ai_config.yaml")
    }

    fn options_path(&self) -> PathBuf {
        self.root.join("options.yaml")
    }

    fn template_path(&self) -> PathBuf {
        self.root.join("line_art_prompt.txt")
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf, StudioError> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(StudioError::Validation(format!("invalid preset name: '{name}'")));
        }
        Ok(self.presets_dir().join(format!("{name}.json")))
    }

    pub fn stored_settings(&self) -> Result<StoredSettings, StudioError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(StoredSettings::default());
        }
        let text = fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Ok(StoredSettings::default());
        }
        serde_yaml::from_str(&text).map_err(|e| StudioError::Storage(format!("{}: {e}", path.display())))
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), StudioError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = NamedTempFile::new_in(parent)?;
    fs::write(tmp.path(), contents)?;
    tmp.persist(path).map_err(|e| StudioError::Storage(format!("{}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl ConfigStore for LocalStore {
    async fn load_settings(&self) -> Result<Settings, StudioError> {
        Ok(self.stored_settings()?.public())
    }

    async fn save_settings(&self, update: &SettingsUpdate) -> Result<(), StudioError> {
        let mut stored = self.stored_settings()?;
        stored.merge(update);
        let yaml = serde_yaml::to_string(&stored).map_err(|e| StudioError::Storage(e.to_string()))?;
        write_atomic(&self.settings_path(), &yaml)
    }
}

#[async_trait]
impl PresetStore for LocalStore {
    async fn list(&self) -> Result<Vec<PresetSummary>, StudioError> {
        let pattern = self.presets_dir().join("*.json");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern).map_err(|e| StudioError::Storage(e.to_string()))?;
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names.into_iter().map(|name| PresetSummary { name }).collect())
    }

    async fn fetch(&self, name: &str) -> Result<Option<Document>, StudioError> {
        let path = self.preset_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let doc = serde_json::from_str(&text)
            .map_err(|e| StudioError::Storage(format!("{}: {e}", path.display())))?;
        Ok(Some(doc))
    }

    async fn create(&self, preset: &Preset) -> Result<(), StudioError> {
        if !preset.data.is_object() {
            return Err(StudioError::Validation("preset data must be a JSON object".into()));
        }
        let path = self.preset_path(&preset.name)?;
        let body = serde_json::to_string_pretty(&canonicalize(preset.data.clone()))
            .map_err(|e| StudioError::Storage(e.to_string()))?;
        write_atomic(&path, &body)?;
        log::debug!("preset saved to {}", path.display());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StudioError> {
        let path = self.preset_path(name)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[async_trait]
impl OptionsSource for LocalStore {
    async fn options(&self) -> Result<OptionsCatalog, StudioError> {
        let path = self.options_path();
        if !path.exists() {
            return Ok(OptionsCatalog::new());
        }
        let text = fs::read_to_string(&path)?;
        serde_yaml::from_str::<Option<OptionsCatalog>>(&text)
            .map(Option::unwrap_or_default)
            .map_err(|e| StudioError::Storage(format!("{}: {e}", path.display())))
    }

    async fn add_option(&self, name: &str, value: &str) -> Result<(), StudioError> {
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return Err(StudioError::Validation("option name and value must not be empty".into()));
        }
        let mut catalog = self.options().await?;
        let list = catalog.entry(name.to_string()).or_default();
        if list.iter().any(|v| v == value) {
            return Ok(());
        }
        list.push(value.to_string());
        let yaml = serde_yaml::to_string(&catalog).map_err(|e| StudioError::Storage(e.to_string()))?;
        write_atomic(&self.options_path(), &yaml)
    }
}

#[async_trait]
impl LineArtTemplates for LocalStore {
    async fn load_template(&self) -> Result<String, StudioError> {
        let path = self.template_path();
        if !path.exists() {
            return Ok(DEFAULT_LINE_ART_TEMPLATE.to_string());
        }
        Ok(fs::read_to_string(&path)?.trim().to_string())
    }

    async fn save_template(&self, text: &str) -> Result<(), StudioError> {
        write_atomic(&self.template_path(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn presets_round_trip_in_canonical_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.fetch("missing").await.unwrap(), None);

        let data = json!({"相机": {"构图": "居中"}, "风格模式": "写实"});
        store.create(&Preset { name: "夏日".into(), data: data.clone() }).await.unwrap();
        store.create(&Preset { name: "a".into(), data: json!({}) }).await.unwrap();

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "夏日"]);

        let loaded = store.fetch("夏日").await.unwrap().unwrap();
        assert_eq!(loaded, data);
        let first_key = loaded.as_object().unwrap().keys().next().cloned();
        assert_eq!(first_key.as_deref(), Some("风格模式"));

        store.delete("夏日").await.unwrap();
        store.delete("夏日").await.unwrap();
        assert_eq!(store.fetch("夏日").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_unsafe_names_and_non_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let bad = Preset { name: "../x".into(), data: json!({}) };
        assert!(matches!(store.create(&bad).await, Err(StudioError::Validation(_))));
        let arr = Preset { name: "x".into(), data: json!([1]) };
        assert!(matches!(store.create(&arr).await, Err(StudioError::Validation(_))));
    }

    #[tokio::test]
    async fn corrupt_preset_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("presets")).unwrap();
        fs::write(dir.path().join("presets/broken.json"), "{not json").unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(store.fetch("broken").await, Err(StudioError::Storage(_))));
    }

    #[tokio::test]
    async fn settings_merge_and_hide_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let initial = store.load_settings().await.unwrap();
        assert_eq!(initial.model, "gpt-5.1");
        assert!(!initial.has_api_key);

        let update = SettingsUpdate { api_key: Some("sk-1".into()), ..Default::default() };
        store.save_settings(&update).await.unwrap();
        let update = SettingsUpdate { model: Some("gpt-4o".into()), ..Default::default() };
        store.save_settings(&update).await.unwrap();

        let settings = store.load_settings().await.unwrap();
        assert!(settings.has_api_key);
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(store.stored_settings().unwrap().api_key, "sk-1");
    }

    #[tokio::test]
    async fn options_and_template_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.options().await.unwrap().is_empty());
        fs::write(dir.path().join("options.yaml"), "禁止元素:\n  - 文字\n  - 水印\n").unwrap();
        assert_eq!(store.options().await.unwrap()["禁止元素"], vec!["文字", "水印"]);

        store.add_option("禁止元素", "签名").await.unwrap();
        store.add_option("禁止元素", "水印").await.unwrap();
        store.add_option("禁止风格", " 卡通 ").await.unwrap();
        assert_eq!(store.field_options("禁止元素").await.unwrap(), vec!["文字", "水印", "签名"]);
        assert_eq!(store.field_options("禁止风格").await.unwrap(), vec!["卡通"]);
        assert!(store.field_options("unknown").await.unwrap().is_empty());
        assert!(matches!(store.add_option("禁止风格", "  ").await, Err(StudioError::Validation(_))));

        assert_eq!(store.load_template().await.unwrap(), DEFAULT_LINE_ART_TEMPLATE);
        store.save_template("简笔画").await.unwrap();
        assert_eq!(store.load_template().await.unwrap(), "简笔画");
    }
}
