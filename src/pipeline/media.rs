//! Media types and stage 1: normalize any accepted document to one image.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use super::provider::ImageAttachment;
use super::render::{PageRenderer, RenderError};
use super::PipelineError;
use crate::models::ValidationError;
use crate::pipeline_config::RenderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
    Webp,
    Tiff,
    Bmp,
}

impl MediaType {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
        }
    }

    /// Parse a declared MIME type. Parameters (`; charset=...`) are ignored.
    pub fn from_mime(mime: &str) -> Result<Self, ValidationError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => Ok(Self::Pdf),
            "image/png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok(Self::Jpeg),
            "image/webp" => Ok(Self::Webp),
            "image/tiff" | "image/tif" => Ok(Self::Tiff),
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => Ok(Self::Bmp),
            _ => Err(ValidationError::UnsupportedMediaType(mime.to_string())),
        }
    }

    /// Guess from a file extension.
    pub fn guess_from_path(path: &Path) -> Result<Self, ValidationError> {
        let guessed = mime_guess::from_path(path).first().ok_or_else(|| {
            ValidationError::UnsupportedMediaType(path.display().to_string())
        })?;
        Self::from_mime(guessed.essence_str())
    }

    /// Documents with pages that must be rasterized first.
    pub fn is_paginated(&self) -> bool {
        matches!(self, Self::Pdf)
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::Webp),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }
}

impl FromStr for MediaType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_mime(s)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}

/// Stage 1. Render page 1 of paginated documents, pass images through.
///
/// Image bytes are sniffed; when the magic bytes disagree with the declared
/// type the sniffed type wins, since vision endpoints reject mislabeled data.
pub async fn normalize(
    bytes: &[u8],
    media_type: MediaType,
    renderer: Option<Arc<dyn PageRenderer>>,
    render: &RenderConfig,
) -> Result<ImageAttachment, PipelineError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyDocument.into());
    }

    if media_type.is_paginated() {
        let renderer = renderer.ok_or_else(|| {
            RenderError::Unavailable(format!("no renderer configured for {media_type}"))
        })?;
        let pdf = bytes.to_vec();
        let dpi = render.dpi;
        let png = tokio::task::spawn_blocking(move || renderer.render_page(&pdf, 0, dpi))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;
        tracing::debug!(dpi, png_size = png.len(), "Rendered first page");
        return Ok(ImageAttachment::new(png, MediaType::Png));
    }

    let effective = match image::guess_format(bytes)
        .ok()
        .and_then(MediaType::from_image_format)
    {
        Some(sniffed) if sniffed != media_type => {
            tracing::warn!(
                declared = %media_type,
                sniffed = %sniffed,
                "Declared media type does not match image bytes"
            );
            sniffed
        }
        _ => media_type,
    };
    Ok(ImageAttachment::new(bytes.to_vec(), effective))
}
