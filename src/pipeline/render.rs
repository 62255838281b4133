//! Page rendering seam: paginated documents in, raster PNG out.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF is password-protected or encrypted")]
    Encrypted,

    #[error("Failed to render page {page}: {reason}")]
    Page { page: usize, reason: String },

    #[error("Image encoding failed: {0}")]
    Encoding(String),

    #[error("PDF renderer unavailable: {0}")]
    Unavailable(String),

    #[error("Rendering task failed: {0}")]
    Task(String),
}

/// Renders pages of a paginated document to PNG bytes.
///
/// Implementations are synchronous; the pipeline runs them on a blocking
/// thread.
pub trait PageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, RenderError>;

    /// Render a zero-based page at `dpi` to PNG.
    fn render_page(&self, pdf_bytes: &[u8], page_number: usize, dpi: u32)
        -> Result<Vec<u8>, RenderError>;
}

/// Renderer returning a fixed 1x1 PNG for each valid page.
pub struct MockPageRenderer {
    page_count: usize,
}

impl MockPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PageRenderer for MockPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, RenderError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, RenderError> {
        if page_number >= self.page_count {
            return Err(RenderError::Page {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (mock has {} pages)",
                    self.page_count
                ),
            });
        }
        Ok(minimal_png())
    }
}

/// Minimal valid 1x1 PNG.
pub fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT chunk
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // IDAT CRC
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND chunk
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_renders_valid_pages() {
        let renderer = MockPageRenderer::new(2);
        assert_eq!(renderer.page_count(b"%PDF").unwrap(), 2);
        let png = renderer.render_page(b"%PDF", 0, 150).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn mock_rejects_out_of_range_page() {
        let renderer = MockPageRenderer::new(1);
        assert!(matches!(
            renderer.render_page(b"%PDF", 3, 150),
            Err(RenderError::Page { page: 3, .. })
        ));
    }

    #[test]
    fn minimal_png_sniffs_as_png() {
        assert_eq!(
            image::guess_format(&minimal_png()).unwrap(),
            image::ImageFormat::Png
        );
    }
}
