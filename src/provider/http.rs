use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::sse::{decode_stream, interpret_server};
use super::{ConfigStore, ImageGenerator, LineArtTemplates, OptionsSource, PresetStore, PromptProvider, PromptStream};
use crate::document::Document;
use crate::errors::StudioError;
use crate::wire::{
    GenerateBody, GeneratedImage, ImageRequest, ImageResponse, ModifyBody, NewOption, OptionsCatalog, Preset, PresetSummary,
    PromptMode, PromptRequest, Settings, SettingsUpdate,
};

/// Client for the prompt studio web backend. Implements every collaborator.
pub struct HttpBackend {
    base_url: String,
    client: Client,
    timeout_secs: u64,
}

#[derive(Serialize, Deserialize)]
struct LineArtBody {
    #[serde(default)]
    prompt: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout_secs,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `collection` with one percent-encoded name segment appended.
    fn named_url(&self, collection: &str, name: &str) -> Result<Url, StudioError> {
        let mut url = Url::parse(&self.url(collection))
            .map_err(|e| StudioError::Validation(format!("bad server url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| StudioError::Validation(format!("server url {} cannot take a path", self.base_url)))?
            .push(name);
        Ok(url)
    }

    fn preset_url(&self, name: &str) -> Result<Url, StudioError> {
        self.named_url("/api/presets", name)
    }

    /// Non-streaming calls get the full timeout; streams only bound connecting.
    fn timed(&self, req: RequestBuilder) -> RequestBuilder {
        req.timeout(Duration::from_secs(self.timeout_secs))
    }

    async fn checked(resp: Response) -> Result<Response, StudioError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let msg = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.error.or(b.detail))
            .unwrap_or(text);
        Err(StudioError::Transport(format!("server error ({status}): {msg}")))
    }
}

#[async_trait]
impl ConfigStore for HttpBackend {
    async fn load_settings(&self) -> Result<Settings, StudioError> {
        let resp = self.timed(self.client.get(self.url("/api/config"))).send().await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    async fn save_settings(&self, update: &SettingsUpdate) -> Result<(), StudioError> {
        let resp = self.timed(self.client.post(self.url("/api/config")).json(update)).send().await?;
        Self::checked(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl PresetStore for HttpBackend {
    async fn list(&self) -> Result<Vec<PresetSummary>, StudioError> {
        let resp = self.timed(self.client.get(self.url("/api/presets"))).send().await?;
        Ok(Self::checked(resp).await?.json().await?)
    }

    async fn fetch(&self, name: &str) -> Result<Option<Document>, StudioError> {
        let resp = self.timed(self.client.get(self.preset_url(name)?)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        // The backend answers with the document itself.
        let data: Document = Self::checked(resp).await?.json().await?;
        Ok(Some(data))
    }

    async fn create(&self, preset: &Preset) -> Result<(), StudioError> {
        let resp = self.timed(self.client.post(self.url("/api/presets")).json(preset)).send().await?;
        Self::checked(resp).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StudioError> {
        let resp = self.timed(self.client.delete(self.preset_url(name)?)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::checked(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl OptionsSource for HttpBackend {
    async fn options(&self) -> Result<OptionsCatalog, StudioError> {
        let resp = self.timed(self.client.get(self.url("/api/options"))).send().await?;
        let raw: serde_json::Map<String, Value> = Self::checked(resp).await?.json().await?;
        Ok(catalog_from_json(raw))
    }

    async fn field_options(&self, name: &str) -> Result<Vec<String>, StudioError> {
        let url = self.named_url("/api/options", name)?;
        let resp = self.timed(self.client.get(url)).send().await?;
        let raw: Value = Self::checked(resp).await?.json().await?;
        Ok(string_list(&raw))
    }

    async fn add_option(&self, name: &str, value: &str) -> Result<(), StudioError> {
        let url = self.named_url("/api/options", name)?;
        let resp = self.timed(self.client.post(url).json(&NewOption { value })).send().await?;
        Self::checked(resp).await?;
        Ok(())
    }
}

fn string_list(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Keep only string-list entries; the backend may ship other metadata.
fn catalog_from_json(raw: serde_json::Map<String, Value>) -> OptionsCatalog {
    raw.into_iter()
        .filter(|(_, v)| v.is_array())
        .map(|(k, v)| {
            let list = string_list(&v);
            (k, list)
        })
        .collect()
}

#[async_trait]
impl PromptProvider for HttpBackend {
    async fn open_stream(&self, req: &PromptRequest) -> Result<PromptStream, StudioError> {
        let builder = match req.mode {
            PromptMode::Generate => self.client.post(self.url("/api/generate")).json(&GenerateBody {
                prompt: &req.instruction,
                images: &req.images,
            }),
            PromptMode::Modify => self.client.post(self.url("/api/modify")).json(&ModifyBody {
                current_data: req.current_document.as_deref().unwrap_or_default(),
                modify_request: &req.instruction,
                images: &req.images,
            }),
        };
        log::debug!("opening {:?} stream against {}", req.mode, self.base_url);
        let resp = Self::checked(builder.send().await?).await?;
        Ok(decode_stream(resp.bytes_stream(), interpret_server))
    }
}

#[async_trait]
impl ImageGenerator for HttpBackend {
    async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, StudioError> {
        let resp = self
            .timed(self.client.post(self.url("/api/generate-image")).json(req))
            .send()
            .await?;
        let body: ImageResponse = Self::checked(resp).await?.json().await?;
        match body {
            ImageResponse { image: Some(data_uri), .. } => Ok(GeneratedImage { data_uri }),
            ImageResponse { error: Some(e), .. } => Err(StudioError::Provider(e)),
            _ => Err(StudioError::Provider("image service returned no image".into())),
        }
    }
}

#[async_trait]
impl LineArtTemplates for HttpBackend {
    async fn load_template(&self) -> Result<String, StudioError> {
        let resp = self.timed(self.client.get(self.url("/api/line-art-prompt"))).send().await?;
        let body: LineArtBody = Self::checked(resp).await?.json().await?;
        Ok(body.prompt)
    }

    async fn save_template(&self, text: &str) -> Result<(), StudioError> {
        let body = LineArtBody { prompt: text.to_string() };
        let resp = self
            .timed(self.client.post(self.url("/api/line-art-prompt")).json(&body))
            .send()
            .await?;
        Self::checked(resp).await?;
        Ok(())
    }
}
