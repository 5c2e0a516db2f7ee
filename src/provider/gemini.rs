use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::ImageGenerator;
use crate::errors::StudioError;
use crate::upload::split_data_uri;
use crate::wire::{GeneratedImage, ImageRequest};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Image generation against a Gemini-compatible `generateContent` endpoint.
pub struct GeminiImageProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
    timeout_secs: u64,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: Option<String>,
    data: String,
}

impl GeminiImageProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        let base_url = base_url.into();
        let base_url = match base_url.trim() {
            "" => DEFAULT_GEMINI_BASE_URL.to_string(),
            url => url.trim_end_matches('/').to_string(),
        };
        Self {
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
            timeout_secs,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Prompt text first, then each reference image inline. Bare base64
    /// strings are sent as JPEG.
    fn build_body(req: &ImageRequest) -> Value {
        let mut parts = vec![json!({ "text": req.prompt })];
        for image in &req.images {
            let (mime, data) = split_data_uri(image).unwrap_or(("image/jpeg", image.as_str()));
            parts.push(json!({ "inline_data": { "mime_type": mime, "data": data } }));
        }
        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": req.aspect_ratio,
                    "imageSize": req.image_size
                }
            }
        })
    }
}

/// First inline image of the reply as a data URI. A text-only reply becomes
/// the error message.
fn image_from_response(body: GenerateResponse) -> Result<GeneratedImage, StudioError> {
    let parts: Vec<Part> = body
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .collect();

    let mut text = String::new();
    for part in parts {
        if let Some(inline) = part.inline_data {
            let mime = inline.mime_type.unwrap_or_else(|| "image/png".to_string());
            return Ok(GeneratedImage { data_uri: format!("data:{mime};base64,{}", inline.data) });
        }
        if let Some(t) = part.text {
            text.push_str(&t);
        }
    }

    if text.trim().is_empty() {
        return Err(StudioError::Provider("image service returned no image".into()));
    }
    let excerpt: String = text.trim().chars().take(100).collect();
    log::warn!("gemini replied with text instead of an image: {excerpt}");
    Err(StudioError::Provider(format!("no image generated; the model replied: {excerpt}")))
}

#[async_trait]
impl ImageGenerator for GeminiImageProvider {
    async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, StudioError> {
        if self.api_key.is_empty() {
            return Err(StudioError::Validation(
                "no Gemini API key configured (set GEMINI_API_KEY or save one with `config set --gemini-api-key`)".into(),
            ));
        }
        log::debug!(
            "POST {} aspect={:?} size={:?} images={}",
            self.endpoint(),
            req.aspect_ratio,
            req.image_size,
            req.images.len()
        );

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&Self::build_body(req))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let msg = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(StudioError::Transport(format!("Gemini API error ({status}): {msg}")));
        }
        image_from_response(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{AspectRatio, ImageSize, ThinkingLevel};

    fn request(images: Vec<String>) -> ImageRequest {
        ImageRequest {
            prompt: "一只柴犬".into(),
            images,
            aspect_ratio: AspectRatio::Portrait3x4,
            image_size: ImageSize::OneK,
            thinking_level: ThinkingLevel::High,
        }
    }

    #[test]
    fn body_carries_layout_and_inline_images() {
        let body = GeminiImageProvider::build_body(&request(vec![
            "data:image/webp;base64,UklGRg==".into(),
            "/9j/4AAQ".into(),
        ]));
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "一只柴犬");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/webp");
        assert_eq!(parts[1]["inline_data"]["data"], "UklGRg==");
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "3:4");
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "1K");
    }

    #[test]
    fn empty_base_url_uses_the_public_endpoint() {
        let provider = GeminiImageProvider::new("", "k", "gemini-3-pro-image-preview", 10);
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
        let proxied = GeminiImageProvider::new("https://proxy.local/", "k", "m", 10);
        assert_eq!(proxied.endpoint(), "https://proxy.local/v1beta/models/m:generateContent");
    }

    #[test]
    fn first_inline_image_wins() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } },
                { "inline_data": { "mime_type": "image/jpeg", "data": "/9j/" } }
            ]}}]
        }))
        .unwrap();
        let image = image_from_response(body).unwrap();
        assert_eq!(image.data_uri, "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn text_only_reply_is_a_provider_error() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't draw that." }] } }]
        }))
        .unwrap();
        let err = image_from_response(body).unwrap_err();
        assert_eq!(err, StudioError::Provider("no image generated; the model replied: I can't draw that.".into()));
        assert!(matches!(
            image_from_response(GenerateResponse::default()),
            Err(StudioError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_is_rejected_before_any_request() {
        let provider = GeminiImageProvider::new("http://127.0.0.1:9", "", "m", 1);
        assert!(matches!(
            provider.generate_image(&request(vec![])).await,
            Err(StudioError::Validation(_))
        ));
    }
}
