//! OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and the page-segmented result every
//! backend returns, so the converter can be exercised without the network.

pub mod mistral;

pub use mistral::MistralOcrProvider;

/// An image the OCR service detected on a page.
#[derive(Debug, Clone)]
pub struct OcrImage {
    /// Identifier used in the page markdown, e.g. `img-0.jpeg`.
    pub id: String,
    /// `data:` URL or raw base64, when the service returned one.
    pub image_base64: Option<String>,
}

/// Per-page OCR output (always 1-indexed).
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub page_num: u32,
    pub markdown: String,
    pub images: Vec<OcrImage>,
}

/// Unified OCR result returned by every provider.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub pages: Vec<OcrPage>,
    pub provider_name: String,
}

impl OcrResult {
    pub fn total_pages(&self) -> u32 {
        self.pages.len() as u32
    }
}

/// Document handed to an OCR provider.
pub struct OcrInput<'a> {
    pub filename: &'a str,
    pub data: &'a [u8],
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, input: &OcrInput<'_>) -> anyhow::Result<OcrResult>;
}
