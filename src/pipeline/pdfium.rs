//! PDF page rendering via Google PDFium.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each operation binds a
//! fresh `Pdfium` instance because the upstream type is `!Send`; the OS
//! caches the library load, so repeat binds are near-free.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::render::{PageRenderer, RenderError};

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumRenderer {
    max_dimension_px: u32,
}

impl PdfiumRenderer {
    /// Create a renderer, verifying the PDFium library is loadable.
    ///
    /// Discovery order:
    /// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
    /// 2. Alongside the running executable
    /// 3. System library search paths
    pub fn new(max_dimension_px: u32) -> Result<Self, RenderError> {
        let _ = load_pdfium()?;
        Ok(Self {
            max_dimension_px: max_dimension_px.max(1),
        })
    }
}

fn load_pdfium() -> Result<Pdfium, RenderError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            RenderError::Unavailable(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        RenderError::Unavailable(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors, detecting encrypted PDFs.
fn map_load_error(e: PdfiumError) -> RenderError {
    let msg = format!("{e}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        RenderError::Encrypted
    } else {
        RenderError::Page {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

/// Pixel dimensions for a page at `dpi`, capped to `max_dim` on the long
/// side with aspect ratio preserved.
fn compute_render_dimensions(
    width_points: f32,
    height_points: f32,
    dpi: u32,
    max_dim: u32,
) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    if longest > max_dim as f32 {
        let ratio = max_dim as f32 / longest;
        let w = ((raw_w * ratio) as u32).clamp(1, max_dim);
        let h = ((raw_h * ratio) as u32).clamp(1, max_dim);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, RenderError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, RenderError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();
        let page_index = u16::try_from(page_number).map_err(|_| RenderError::Page {
            page: page_number,
            reason: format!("Page index {page_number} exceeds u16 maximum"),
        })?;
        let page = pages.get(page_index).map_err(|_| RenderError::Page {
            page: page_number,
            reason: format!(
                "Page {page_number} out of range (document has {} pages)",
                pages.len()
            ),
        })?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) =
            compute_render_dimensions(width_points, height_points, dpi, self.max_dimension_px);

        let uncapped_w = (width_points * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w < uncapped_w {
            warn!(
                page = page_number,
                raw_width = uncapped_w,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped"
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::Page {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| RenderError::Encoding(format!("PNG encoding failed: {e}")))?;
        let png_bytes = cursor.into_inner();

        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );

        Ok(png_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_150dpi() {
        let (w, h) = compute_render_dimensions(595.0, 842.0, 150, 4096);
        assert!(w > 1200 && w < 1260, "A4 width at 150dpi: got {w}");
        assert!(h > 1720 && h < 1780, "A4 height at 150dpi: got {h}");
    }

    #[test]
    fn oversized_page_is_capped() {
        let (w, h) = compute_render_dimensions(5000.0, 7000.0, 200, 4096);
        assert_eq!(h, 4096);
        assert!(w < h);
    }

    #[test]
    fn aspect_ratio_preserved_when_capped() {
        let (w, h) = compute_render_dimensions(4000.0, 2000.0, 300, 2048);
        assert_eq!(w, 2048);
        assert_eq!(h, 1024);
    }

    #[test]
    fn tiny_page_has_at_least_one_pixel() {
        let (w, h) = compute_render_dimensions(0.1, 0.1, 72, 4096);
        assert!(w >= 1 && h >= 1);
    }
}
