use std::io::Cursor;
use std::sync::Arc;

use tracing::warn;

use crate::error::ExtractionError;
use crate::processor::{pdf, DocumentFormat};

/// Recognises text in rasterised documents.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractionError>;
}

/// Tesseract-backed OCR. Without the `ocr` feature every call reports
/// [`ExtractionError::OcrUnavailable`].
#[derive(Clone)]
pub struct TesseractOcr {
    inner: Arc<TesseractOcrInner>,
}

struct TesseractOcrInner {
    languages: String,
    dpi: u32,
}

impl TesseractOcr {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(TesseractOcrInner {
                languages: lang_str,
                dpi,
            }),
        }
    }

    pub fn dpi(&self) -> u32 {
        self.inner.dpi
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }

    pub fn recognize_image(&self, image_data: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("processor.ocr").entered();

        let png = to_png(image_data)?;
        let mut session = OcrSession::acquire(&self.inner.languages)?;
        session.read(&png)
    }

    /// One engine session serves every page of the document.
    pub fn recognize_pdf(&self, pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("processor.ocr", dpi = self.inner.dpi).entered();

        let mut session = OcrSession::acquire(&self.inner.languages)?;

        let pages = pdf::render_pages(pdf_bytes, self.inner.dpi)?;
        if pages.is_empty() {
            return Err(ExtractionError::OcrFailed(
                "No pages could be rendered".to_string(),
            ));
        }

        let mut all_text = String::new();
        for (index, page) in pages.iter().enumerate() {
            match session.read(page) {
                Ok(page_text) => {
                    all_text.push_str(&page_text);
                    all_text.push('\n');
                }
                Err(e) => warn!(page = index + 1, "OCR failed for page: {}", e),
            }
        }

        Ok(all_text)
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractionError> {
        match format {
            DocumentFormat::Image => self.recognize_image(bytes),
            DocumentFormat::Pdf => self.recognize_pdf(bytes),
            other => Err(ExtractionError::OcrFailed(format!(
                "{:?} documents cannot be scanned",
                other
            ))),
        }
    }
}

/// Re-encodes any supported raster format as PNG for the engine.
fn to_png(image_data: &[u8]) -> Result<Vec<u8>, ExtractionError> {
    let img = image::load_from_memory(image_data)
        .map_err(|e| ExtractionError::OcrFailed(format!("Failed to load image: {}", e)))?;

    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| ExtractionError::OcrFailed(format!("Failed to convert image: {}", e)))?;

    Ok(png_data)
}

/// An initialised Tesseract engine, released when dropped.
#[cfg(feature = "ocr")]
struct OcrSession {
    engine: leptess::LepTess,
}

#[cfg(feature = "ocr")]
impl OcrSession {
    fn acquire(languages: &str) -> Result<Self, ExtractionError> {
        let engine = leptess::LepTess::new(None, languages).map_err(|e| {
            ExtractionError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;
        tracing::trace!(languages, "Acquired OCR engine");
        Ok(Self { engine })
    }

    fn read(&mut self, png: &[u8]) -> Result<String, ExtractionError> {
        self.engine
            .set_image_from_mem(png)
            .map_err(|e| ExtractionError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        self.engine
            .get_utf8_text()
            .map_err(|e| ExtractionError::OcrFailed(format!("OCR failed: {}", e)))
    }
}

#[cfg(feature = "ocr")]
impl Drop for OcrSession {
    fn drop(&mut self) {
        tracing::trace!("Released OCR engine");
    }
}

#[cfg(not(feature = "ocr"))]
struct OcrSession;

#[cfg(not(feature = "ocr"))]
impl OcrSession {
    fn acquire(_languages: &str) -> Result<Self, ExtractionError> {
        Err(ExtractionError::OcrUnavailable(
            "built without the `ocr` feature".to_string(),
        ))
    }

    fn read(&mut self, _png: &[u8]) -> Result<String, ExtractionError> {
        Err(ExtractionError::OcrUnavailable(
            "built without the `ocr` feature".to_string(),
        ))
    }
}
