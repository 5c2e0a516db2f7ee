use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::document::Document;

/// ========================================
/// Collaborator request/response shapes
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    Generate,
    Modify,
}

/// Instruction sent to the generate/modify collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub mode: PromptMode,
    pub instruction: String,
    /// Data URIs, at most three.
    pub images: Vec<String>,
    /// Serialized current document; modify only.
    pub current_document: Option<String>,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateBody<'a> {
    pub prompt: &'a str,
    pub images: &'a [String],
}

/// Body of `POST /api/modify`.
#[derive(Debug, Clone, Serialize)]
pub struct ModifyBody<'a> {
    pub current_data: &'a str,
    pub modify_request: &'a str,
    pub images: &'a [String],
}

/// One decoded event of a prompt stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Done,
}

/// `data:` payload sent by the web backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerChunk {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Settings as reported by the config collaborator; keys are never echoed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub gemini_base_url: String,
    #[serde(default)]
    pub gemini_model: String,
    #[serde(default)]
    pub has_api_key: bool,
    #[serde(default)]
    pub has_gemini_api_key: bool,
}

/// Partial update accepted by the config collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetSummary {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub data: Document,
}

/// Named candidate lists, e.g. `禁止元素` and `禁止风格`.
pub type OptionsCatalog = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    #[value(name = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    #[value(name = "2:3")]
    Portrait2x3,
    #[serde(rename = "3:2")]
    #[value(name = "3:2")]
    Landscape3x2,
    #[serde(rename = "3:4")]
    #[value(name = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    #[value(name = "4:3")]
    Landscape4x3,
    #[serde(rename = "4:5")]
    #[value(name = "4:5")]
    Portrait4x5,
    #[serde(rename = "5:4")]
    #[value(name = "5:4")]
    Landscape5x4,
    #[serde(rename = "9:16")]
    #[value(name = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    #[value(name = "16:9")]
    Landscape16x9,
    #[serde(rename = "21:9")]
    #[value(name = "21:9")]
    Ultrawide21x9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ImageSize {
    #[serde(rename = "1K")]
    #[value(name = "1K")]
    OneK,
    #[default]
    #[serde(rename = "2K")]
    #[value(name = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    #[value(name = "4K")]
    FourK,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    None,
    #[default]
    Low,
    Medium,
    High,
}

/// Body of `POST /api/generate-image`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub images: Vec<String>,
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
    pub thinking_level: ThinkingLevel,
}

/// Body of `POST /api/options/<name>`.
#[derive(Debug, Clone, Serialize)]
pub struct NewOption<'a> {
    pub value: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A generated image as a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub data_uri: String,
}
