use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::warn;

use crate::error::ExtractionError;

/// Extracts the embedded text layer of every page.
pub fn extract_text(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    let _span = tracing::info_span!("processor.pdf").entered();

    let doc = lopdf::Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }

    Ok(text)
}

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Text shorter than this is never judged on its character composition.
const MIN_TOTAL_CHARS: usize = 50;

/// Below this share of alphanumeric characters the text layer is garbled.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Returns true when the text layer is empty, made only of font encoding
/// markers, or mostly non-alphanumeric noise.
pub fn should_use_ocr(text: &str) -> bool {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");

    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

/// A file in the temp directory that is removed when dropped.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn write(prefix: &str, extension: &str, contents: &[u8]) -> Result<Self, ExtractionError> {
        let path = std::env::temp_dir().join(format!(
            "{}_{}.{}",
            prefix,
            uuid::Uuid::new_v4(),
            extension
        ));
        std::fs::write(&path, contents)
            .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to write temp PDF: {}", e)))?;
        Ok(Self { path })
    }

    fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Rasterises every page to PNG with `pdftoppm`. Pages that fail to render
/// are skipped with a warning; every temporary file is removed.
pub(crate) fn render_pages(pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
    let pdf = ScratchFile::write("cvtailor_ocr", "pdf", pdf_bytes)?;

    let page_count = match lopdf::Document::load_mem(pdf_bytes) {
        Ok(doc) => doc.get_pages().len(),
        Err(_) => count_pages_with_pdfinfo(pdf.path())?,
    };

    let mut pages = Vec::with_capacity(page_count);
    for page_num in 1..=page_count as u32 {
        match render_page(pdf.path(), page_num, dpi) {
            Ok(png) => pages.push(png),
            Err(e) => warn!(page = page_num, "Skipping page that failed to render: {}", e),
        }
    }

    Ok(pages)
}

/// Used when lopdf can't parse the PDF structure.
fn count_pages_with_pdfinfo(pdf_path: &Path) -> Result<usize, ExtractionError> {
    let output = Command::new("pdfinfo").arg(pdf_path).output().map_err(|e| {
        ExtractionError::PdfProcessing(format!(
            "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(ExtractionError::PdfProcessing(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_pdfinfo_pages(stdout: &str) -> usize {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("Pages:"))
        .find_map(|count| count.trim().parse::<usize>().ok())
        .unwrap_or(1)
}

fn render_page(pdf_path: &Path, page_num: u32, dpi: u32) -> Result<Vec<u8>, ExtractionError> {
    let output_prefix =
        std::env::temp_dir().join(format!("cvtailor_page_{}", uuid::Uuid::new_v4()));
    let page = page_num.to_string();

    let output = Command::new("pdftoppm")
        .args(["-png", "-r", &dpi.to_string(), "-f", &page, "-l", &page])
        .arg(pdf_path)
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            ExtractionError::PdfProcessing(format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    // pdftoppm pads the page suffix to the width of the page count.
    let candidates = [
        format!("{}-{}.png", output_prefix.display(), page_num),
        format!("{}-{:02}.png", output_prefix.display(), page_num),
        format!("{}-{:03}.png", output_prefix.display(), page_num),
    ];
    let rendered = candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .map(ScratchFile::adopt);

    if !output.status.success() {
        return Err(ExtractionError::PdfProcessing(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let image = rendered.ok_or_else(|| {
        ExtractionError::PdfProcessing("Failed to find rendered page image".to_string())
    })?;

    std::fs::read(image.path()).map_err(|e| {
        ExtractionError::PdfProcessing(format!("Failed to read rendered image: {}", e))
    })
}
