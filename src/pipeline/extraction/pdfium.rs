//! PDF page rendering via Google PDFium, feeding the OCR tier.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each operation binds a
//! fresh `Pdfium` instance because the upstream type is `!Send`; the OS
//! caches the dynamic library load, so repeat binds are cheap.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Maximum dimension (width or height) for rendered page images.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

/// Env var naming an explicit PDFium library file.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a renderer, failing fast if the PDFium library cannot be bound.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = bind_pdfium()?;
        Ok(Self)
    }
}

/// Bind PDFium: explicit env path, then next to the executable, then the
/// system library search path.
fn bind_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_ENV) {
        debug!(path = %path, "Binding PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::Unavailable(format!("PDFium at {path} could not be bound: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Bound PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::Unavailable(format!(
            "PDFium library not found; set {PDFIUM_LIB_ENV} or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDF: {msg}"),
        }
    }
}

/// Pixel dimensions for a page at `dpi`, both clamped to [1, MAX_DIMENSION_PX]
/// with the aspect ratio kept when capping.
fn render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let w = (width_points * scale).max(1.0);
    let h = (height_points * scale).max(1.0);

    let longest = w.max(h);
    if longest <= MAX_DIMENSION_PX as f32 {
        return (w as u32, h as u32);
    }

    let ratio = MAX_DIMENSION_PX as f32 / longest;
    (
        ((w * ratio) as u32).clamp(1, MAX_DIMENSION_PX),
        ((h * ratio) as u32).clamp(1, MAX_DIMENSION_PX),
    )
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = bind_pdfium()?;
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
    ) -> Result<Vec<u8>, ExtractionError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();

        let index = u16::try_from(page_number).map_err(|_| ExtractionError::PdfRendering {
            page: page_number,
            reason: "page index exceeds u16".into(),
        })?;
        let page = pages.get(index).map_err(|_| ExtractionError::PdfRendering {
            page: page_number,
            reason: format!("out of range (document has {} pages)", pages.len()),
        })?;

        let (width, height) = render_dimensions(page.width().value, page.height().value, dpi);
        if width == MAX_DIMENSION_PX || height == MAX_DIMENSION_PX {
            warn!(page = page_number, width, height, dpi, "Page render capped");
        }

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: e.to_string(),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

        let png = cursor.into_inner();
        debug!(page = page_number, width, height, bytes = png.len(), "Rendered page");
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_page_at_200_dpi() {
        // 8.5 x 11 in
        let (w, h) = render_dimensions(612.0, 792.0, 200);
        assert!(w.abs_diff(1700) <= 1, "width {w}");
        assert!(h.abs_diff(2200) <= 1, "height {h}");
    }

    #[test]
    fn oversized_page_is_capped_keeping_aspect() {
        let (w, h) = render_dimensions(612.0, 792.0, 600);
        assert_eq!(h, MAX_DIMENSION_PX);
        assert!(w < h);
        let ratio = w as f32 / h as f32;
        assert!((ratio - 612.0 / 792.0).abs() < 0.01);
    }

    #[test]
    fn degenerate_page_never_zero() {
        assert_eq!(render_dimensions(0.0, 0.0, 200), (1, 1));
    }
}
