pub mod docx;
pub mod ocr;
pub mod pdf;
pub mod text;

use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::config::schema::{ExtractionConfig, OcrConfig};
use crate::error::ExtractionError;

pub use ocr::{OcrEngine, TesseractOcr};

/// Documents with fewer characters than this are treated as unreadable.
pub const DEFAULT_MIN_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
    Image,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" | "md" => Some(Self::Text),
            "png" | "jpg" | "jpeg" | "tiff" | "tif" | "bmp" | "gif" | "webp" => Some(Self::Image),
            _ => None,
        }
    }

    /// Infers the format from a file name. Unknown or missing extensions are
    /// decoded as plain text.
    pub fn from_file_name(file_name: &str) -> Self {
        std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or(Self::Text)
    }

    /// Formats that may carry their content only as pixels.
    pub fn is_scannable(&self) -> bool {
        matches!(self, Self::Pdf | Self::Image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Direct,
    Ocr,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub format: DocumentFormat,
    pub method: ExtractionMethod,
}

/// Converts raw resume bytes into plain text.
///
/// The direct decode is always tried first. OCR runs only for scannable
/// formats whose direct text is missing, garbled or shorter than
/// `min_text_chars`.
pub struct TextExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    min_text_chars: usize,
}

impl TextExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, min_text_chars: usize) -> Self {
        Self {
            ocr,
            min_text_chars,
        }
    }

    pub fn from_config(ocr: &OcrConfig, extraction: &ExtractionConfig) -> Self {
        let engine: Option<Arc<dyn OcrEngine>> = if ocr.enabled {
            Some(Arc::new(TesseractOcr::new(&ocr.languages, ocr.dpi)))
        } else {
            None
        };
        Self::new(engine, extraction.min_text_chars)
    }

    pub fn min_text_chars(&self) -> usize {
        self.min_text_chars
    }

    pub fn extract(&self, bytes: &[u8], file_name: &str) -> Result<Extraction, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyInput {
                file_name: file_name.to_string(),
            });
        }

        let format = DocumentFormat::from_file_name(file_name);
        let _span = info_span!("processor.extract", format = ?format, bytes = bytes.len()).entered();

        let direct = decode_direct(bytes, format);

        let (raw_text, method) = match fallback_reason(format, &direct, self.min_text_chars) {
            None => (direct?, ExtractionMethod::Direct),
            Some(reason) => self.ocr_fallback(bytes, format, direct, reason)?,
        };

        let text = text::normalize(&raw_text);
        let chars = char_count(&text);
        if chars < self.min_text_chars {
            return Err(ExtractionError::TextTooShort {
                chars,
                min: self.min_text_chars,
            });
        }

        debug!(chars, method = ?method, "Extracted resume text");

        Ok(Extraction {
            text,
            format,
            method,
        })
    }

    fn ocr_fallback(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
        direct: Result<String, ExtractionError>,
        reason: &'static str,
    ) -> Result<(String, ExtractionMethod), ExtractionError> {
        let Some(ref ocr) = self.ocr else {
            return match direct {
                Ok(_) if format == DocumentFormat::Image => Err(ExtractionError::OcrUnavailable(
                    "image documents require OCR, which is disabled".to_string(),
                )),
                Ok(text) => Ok((text, ExtractionMethod::Direct)),
                Err(e) => Err(e),
            };
        };

        let _ocr_span = info_span!("processor.ocr_fallback", reason).entered();

        match ocr.recognize(bytes, format) {
            Ok(text) if !text.trim().is_empty() => Ok((text, ExtractionMethod::Ocr)),
            Ok(_) => match direct {
                Ok(text) => Ok((text, ExtractionMethod::Direct)),
                Err(e) => Err(ExtractionError::BothPathsFailed {
                    direct: e.to_string(),
                    ocr: "no text recognised".to_string(),
                }),
            },
            Err(ocr_err) => match direct {
                Ok(text) => {
                    warn!("OCR fallback failed, keeping direct text: {}", ocr_err);
                    Ok((text, ExtractionMethod::Direct))
                }
                Err(e) => Err(ExtractionError::BothPathsFailed {
                    direct: e.to_string(),
                    ocr: ocr_err.to_string(),
                }),
            },
        }
    }
}

fn decode_direct(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractionError> {
    match format {
        DocumentFormat::Text => Ok(text::decode(bytes)),
        DocumentFormat::Pdf => pdf::extract_text(bytes),
        DocumentFormat::Docx => docx::extract_text(bytes),
        DocumentFormat::Image => Ok(String::new()),
    }
}

fn fallback_reason(
    format: DocumentFormat,
    direct: &Result<String, ExtractionError>,
    min_text_chars: usize,
) -> Option<&'static str> {
    if !format.is_scannable() {
        return None;
    }
    match direct {
        Err(_) => Some("direct_decode_failed"),
        Ok(text) if char_count(text) < min_text_chars => Some("text_too_short"),
        Ok(text) if format == DocumentFormat::Pdf && pdf::should_use_ocr(text) => {
            Some("text_quality")
        }
        Ok(_) => None,
    }
}

/// Number of characters after trimming, counted as Unicode scalar values.
pub fn char_count(text: &str) -> usize {
    text.trim().chars().count()
}
