//! Reference images held by one upload surface.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fs_err as fs;
use std::path::Path;

use crate::errors::StudioError;

pub const MAX_IMAGES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    images: Vec<String>,
}

impl ImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a data URI. Beyond the cap the image is rejected, not queued.
    pub fn try_add(&mut self, data_uri: String) -> Result<(), StudioError> {
        if self.images.len() >= MAX_IMAGES {
            log::warn!("image rejected: surface already holds {MAX_IMAGES}");
            return Err(StudioError::Capacity(MAX_IMAGES));
        }
        self.images.push(data_uri);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.images
    }
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Read an image file into a data URI; non-image extensions are refused.
pub fn load_image(path: &Path) -> Result<String, StudioError> {
    let mime = mime_for(path)
        .ok_or_else(|| StudioError::Validation(format!("{} is not an image", path.display())))?;
    let bytes = fs::read(path)?;
    Ok(encode_data_uri(mime, &bytes))
}

/// Mime type and still-encoded payload of a base64 data URI.
pub fn split_data_uri(uri: &str) -> Result<(&str, &str), StudioError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| StudioError::Validation("not a data URI".into()))?;
    rest.split_once(";base64,")
        .ok_or_else(|| StudioError::Validation("data URI is not base64".into()))
}

/// Split a data URI into its mime type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), StudioError> {
    let (mime, encoded) = split_data_uri(uri)?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| StudioError::Validation(format!("bad base64 payload: {e}")))?;
    Ok((mime.to_string(), bytes))
}

pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "png",
    }
}
