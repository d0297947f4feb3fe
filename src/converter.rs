//! PDF → markdown conversion through an OCR provider.

use crate::error::ProcessingError;
use crate::ocr::{OcrInput, OcrPage, OcrProvider, OcrResult};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// PDF header marker; readers accept it anywhere in the first 1024 bytes.
const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_HEADER_WINDOW: usize = 1024;

/// Text artifacts produced from one PDF.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    /// Page-segmented markdown with image links removed. Feeds the mapper.
    pub markdown: String,
    /// Same markdown with `![id](id)` links pointing at the embedded image data.
    pub markdown_with_images: String,
    pub total_pages: u32,
    /// Characters of page content, excluding page headers and image lines.
    pub text_chars: usize,
}

impl ConvertedDocument {
    pub fn is_empty(&self) -> bool {
        self.text_chars == 0
    }

    /// Build both artifacts from a raw OCR result.
    pub fn from_ocr(ocr: &OcrResult) -> Self {
        let text_chars = ocr
            .pages
            .iter()
            .map(|p| strip_image_lines(&p.markdown).trim().chars().count())
            .sum();

        Self {
            markdown: combine_pages(&ocr.pages, false),
            markdown_with_images: combine_pages(&ocr.pages, true),
            total_pages: ocr.total_pages(),
            text_chars,
        }
    }
}

/// Runs uploads through an [`OcrProvider`] and assembles the page text.
#[derive(Clone)]
pub struct DocumentConverter {
    provider: Arc<dyn OcrProvider>,
}

impl DocumentConverter {
    pub fn new(provider: Arc<dyn OcrProvider>) -> Self {
        Self { provider }
    }

    pub async fn convert(
        &self,
        filename: &str,
        pdf_bytes: &[u8],
    ) -> Result<ConvertedDocument, ProcessingError> {
        ensure_pdf(pdf_bytes)?;

        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(pdf_bytes);
            format!("{:x}", hasher.finalize())
        };
        info!(
            "Converting {} ({} bytes, sha256={}) with provider={}",
            filename,
            pdf_bytes.len(),
            &content_hash[..12],
            self.provider.name()
        );

        let input = OcrInput {
            filename,
            data: pdf_bytes,
        };
        let ocr = self
            .provider
            .process(&input)
            .await
            .map_err(|e| ProcessingError::OcrService(format!("{:#}", e)))?;

        let document = ConvertedDocument::from_ocr(&ocr);
        debug!(
            "OCR returned {} pages, {} text chars, {} markdown chars",
            document.total_pages,
            document.text_chars,
            document.markdown.len()
        );
        Ok(document)
    }

    /// Convert a PDF already on disk, reporting it to the OCR service as `filename`.
    pub async fn convert_file(
        &self,
        path: &Path,
        filename: &str,
    ) -> Result<ConvertedDocument, ProcessingError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            ProcessingError::InvalidInput(format!("Cannot read {}: {}", path.display(), e))
        })?;
        self.convert(filename, &data).await
    }
}

/// Reject empty input and anything without a PDF header.
pub fn ensure_pdf(bytes: &[u8]) -> Result<(), ProcessingError> {
    if bytes.is_empty() {
        return Err(ProcessingError::InvalidInput("Uploaded file is empty".to_string()));
    }
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(ProcessingError::InvalidInput(
            "File is not a valid PDF (missing %PDF- header)".to_string(),
        ));
    }
    Ok(())
}

/// Concatenate pages into one document, each under a `## Page N` header.
pub fn combine_pages(pages: &[OcrPage], embed_images: bool) -> String {
    let mut parts = Vec::with_capacity(pages.len() * 3);
    for page in pages {
        parts.push(format!("\n## Page {}\n---\n", page.page_num));
        let content = if embed_images {
            embed_page_images(page)
        } else {
            strip_image_lines(&page.markdown)
        };
        parts.push(content);
        parts.push("\n".to_string());
    }
    parts.join("\n")
}

fn strip_image_lines(markdown: &str) -> String {
    markdown
        .lines()
        .filter(|line| !line.trim_start().starts_with("!["))
        .collect::<Vec<_>>()
        .join("\n")
}

fn embed_page_images(page: &OcrPage) -> String {
    let mut markdown = page.markdown.clone();
    for image in &page.images {
        if let Some(data) = &image.image_base64 {
            markdown = markdown.replace(
                &format!("![{0}]({0})", image.id),
                &format!("![{}]({})", image.id, data),
            );
        }
    }
    markdown
}

fn text_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"!\[.*?\]\(.*?\)", ""),        // images
            (r"\[(.*?)\]\(.*?\)", "${1}"),   // links → text
            (r"(?m)^#+\s+", ""),             // headers
            (r"(?m)^---\s*$", ""),           // horizontal rules
            (r"\*\*(.*?)\*\*", "${1}"),      // bold
            (r"\*(.*?)\*", "${1}"),          // italic
            (r"(?s)```.*?```", ""),          // code blocks
            (r"`.*?`", ""),                  // inline code
            (r"(?m)^>\s+", ""),              // blockquotes
            (r"(?m)^[\*\-]\s+", ""),         // list markers
            (r"\n\s*\n", "\n\n"),            // blank line runs
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
            Ok(re) => Some((re, replacement)),
            Err(e) => {
                tracing::warn!("Invalid markdown cleanup pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
    })
}

/// Plain-text rendering of OCR markdown.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = markdown.to_string();
    for (re, replacement) in text_rules() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    text.trim().to_string()
}
