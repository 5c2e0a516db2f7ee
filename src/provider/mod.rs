use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::cli::{BackendKind, ProviderKind};
use crate::config::{Config, ENV_GEMINI_KEY, ENV_OPENAI_KEY};
use crate::document::Document;
use crate::errors::StudioError;
use crate::wire::{
    GeneratedImage, ImageRequest, OptionsCatalog, Preset, PresetSummary, PromptRequest, Settings, SettingsUpdate,
    StreamEvent,
};

pub mod gemini;
pub mod http;
pub mod local;
pub mod openai;
pub mod sse;

/// Incremental text fragments of one generate/modify call. Dropping the
/// stream closes the underlying connection.
pub type PromptStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, StudioError>> + Send>>;

#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn open_stream(&self, req: &PromptRequest) -> Result<PromptStream, StudioError>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_settings(&self) -> Result<Settings, StudioError>;
    async fn save_settings(&self, update: &SettingsUpdate) -> Result<(), StudioError>;
}

#[async_trait]
pub trait PresetStore: Send + Sync {
    async fn list(&self) -> Result<Vec<PresetSummary>, StudioError>;
    /// `Ok(None)` when no preset has that name.
    async fn fetch(&self, name: &str) -> Result<Option<Document>, StudioError>;
    async fn create(&self, preset: &Preset) -> Result<(), StudioError>;
    async fn delete(&self, name: &str) -> Result<(), StudioError>;
}

#[async_trait]
pub trait OptionsSource: Send + Sync {
    async fn options(&self) -> Result<OptionsCatalog, StudioError>;

    /// Candidates of one list; an unknown name reads as empty.
    async fn field_options(&self, name: &str) -> Result<Vec<String>, StudioError> {
        Ok(self.options().await?.remove(name).unwrap_or_default())
    }

    /// Append a candidate to a list, creating the list if needed.
    async fn add_option(&self, name: &str, value: &str) -> Result<(), StudioError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, StudioError>;
}

#[async_trait]
pub trait LineArtTemplates: Send + Sync {
    async fn load_template(&self) -> Result<String, StudioError>;
    async fn save_template(&self, text: &str) -> Result<(), StudioError>;
}

/// Every collaborator the editor talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigStore>,
    pub presets: Arc<dyn PresetStore>,
    pub options: Arc<dyn OptionsSource>,
    pub prompts: Arc<dyn PromptProvider>,
    pub images: Arc<dyn ImageGenerator>,
    pub line_art: Arc<dyn LineArtTemplates>,
}

/// Wire the collaborators for the configured backend and provider. The local
/// backend has no relay, so it always talks to the models directly.
pub fn make_collaborators(cfg: &Config) -> anyhow::Result<Collaborators> {
    match cfg.backend {
        BackendKind::Http => {
            let backend = Arc::new(http::HttpBackend::new(cfg.server_url.clone(), cfg.timeout_secs));
            let prompts: Arc<dyn PromptProvider> = match cfg.provider {
                ProviderKind::Server => backend.clone(),
                ProviderKind::OpenAI => Arc::new(direct_provider(cfg, None)?),
            };
            Ok(Collaborators {
                config: backend.clone(),
                presets: backend.clone(),
                options: backend.clone(),
                prompts,
                images: backend.clone(),
                line_art: backend,
            })
        }
        BackendKind::Local => {
            let store = Arc::new(local::LocalStore::new(cfg.data_path()));
            if cfg.provider == ProviderKind::Server {
                log::debug!("local backend selected; using the direct provider");
            }
            let prompts = Arc::new(direct_provider(cfg, Some(&store))?);
            Ok(Collaborators {
                config: store.clone(),
                presets: store.clone(),
                options: store.clone(),
                prompts,
                images: Arc::new(gemini_provider(cfg, &store)?),
                line_art: store,
            })
        }
    }
}

fn direct_provider(cfg: &Config, store: Option<&local::LocalStore>) -> anyhow::Result<openai::OpenAiProvider> {
    let stored = match store {
        Some(s) => s.stored_settings()?,
        None => local::StoredSettings::default(),
    };
    let api_key = std::env::var(ENV_OPENAI_KEY)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .unwrap_or(stored.api_key);
    let model = cfg.model.clone().unwrap_or(stored.model);
    Ok(openai::OpenAiProvider::new(stored.base_url, api_key, model, cfg.timeout_secs))
}

fn gemini_provider(cfg: &Config, store: &local::LocalStore) -> anyhow::Result<gemini::GeminiImageProvider> {
    let stored = store.stored_settings()?;
    let api_key = std::env::var(ENV_GEMINI_KEY)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .unwrap_or(stored.gemini_api_key);
    Ok(gemini::GeminiImageProvider::new(
        stored.gemini_base_url,
        api_key,
        stored.gemini_model,
        cfg.timeout_secs,
    ))
}
