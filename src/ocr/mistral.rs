//! Mistral OCR: upload to the Files API, fetch a signed URL, run OCR on it.

use super::{OcrImage, OcrInput, OcrPage, OcrProvider, OcrResult};
use crate::config::Config;
use crate::mistral::MistralApi;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Signed URL lifetime, in hours.
const SIGNED_URL_EXPIRY_HOURS: &str = "1";

pub struct MistralOcrProvider {
    api: MistralApi,
    model: String,
}

impl MistralOcrProvider {
    pub fn new(config: &Config, client: reqwest::Client) -> anyhow::Result<Self> {
        Ok(Self {
            api: MistralApi::new(config, client)?,
            model: config.ocr_model.clone(),
        })
    }

    /// Store the PDF with `purpose=ocr` and return its file id.
    async fn upload(&self, input: &OcrInput<'_>) -> anyhow::Result<String> {
        let part = Part::bytes(input.data.to_vec())
            .file_name(input.filename.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part).text("purpose", "ocr");

        let uploaded: UploadedFile = self.api.post_form("files", form, "Mistral file upload").await?;
        info!(
            "Uploaded {} ({} bytes) as file_id={}",
            input.filename,
            input.data.len(),
            uploaded.id
        );
        Ok(uploaded.id)
    }

    async fn signed_url(&self, file_id: &str) -> anyhow::Result<String> {
        let signed: SignedUrl = self
            .api
            .get_json(
                &format!("files/{}/url", file_id),
                &[("expiry", SIGNED_URL_EXPIRY_HOURS)],
                "Mistral signed URL",
            )
            .await?;
        Ok(signed.url)
    }
}

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &str {
        "mistral_ocr"
    }

    async fn process(&self, input: &OcrInput<'_>) -> anyhow::Result<OcrResult> {
        let file_id = self.upload(input).await?;
        let document_url = self.signed_url(&file_id).await?;

        info!("Running OCR on file_id={} with model={}", file_id, self.model);
        let request = OcrRequest {
            model: &self.model,
            document: OcrDocument::DocumentUrl { document_url },
            include_image_base64: true,
        };
        let response: OcrResponse = self.api.post_json("ocr", &request, "Mistral OCR").await?;

        let pages = response.into_pages();
        info!("OCR returned {} pages", pages.len());
        Ok(OcrResult {
            pages,
            provider_name: self.name().to_string(),
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument,
    include_image_base64: bool,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OcrDocument {
    DocumentUrl { document_url: String },
}

#[derive(Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrl {
    url: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<PageResponse>,
}

#[derive(Deserialize)]
struct PageResponse {
    /// Zero-based.
    index: u32,
    markdown: String,
    #[serde(default)]
    images: Vec<ImageResponse>,
}

#[derive(Deserialize)]
struct ImageResponse {
    id: String,
    #[serde(default)]
    image_base64: Option<String>,
}

impl OcrResponse {
    /// Pages in document order, numbered from 1.
    fn into_pages(self) -> Vec<OcrPage> {
        let mut pages: Vec<OcrPage> = self
            .pages
            .into_iter()
            .map(|page| OcrPage {
                page_num: page.index + 1,
                markdown: page.markdown,
                images: page
                    .images
                    .into_iter()
                    .map(|image| OcrImage {
                        id: image.id,
                        image_base64: image.image_base64,
                    })
                    .collect(),
            })
            .collect();
        pages.sort_by_key(|page| page.page_num);
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = OcrRequest {
            model: "mistral-ocr-latest",
            document: OcrDocument::DocumentUrl {
                document_url: "https://files.example/signed".to_string(),
            },
            include_image_base64: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "mistral-ocr-latest",
                "document": {"type": "document_url", "document_url": "https://files.example/signed"},
                "include_image_base64": true
            })
        );
    }

    #[test]
    fn test_pages_sorted_and_one_indexed() {
        let raw = json!({
            "pages": [
                {"index": 1, "markdown": "second", "images": []},
                {"index": 0, "markdown": "first ![img-0.jpeg](img-0.jpeg)",
                 "images": [{"id": "img-0.jpeg", "image_base64": "data:image/jpeg;base64,AA"}]},
                {"index": 2, "markdown": "third"}
            ]
        });
        let response: OcrResponse = serde_json::from_value(raw).unwrap();
        let pages = response.into_pages();

        let numbers: Vec<u32> = pages.iter().map(|p| p.page_num).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(pages[0].markdown, "first ![img-0.jpeg](img-0.jpeg)");
        assert_eq!(pages[0].images[0].id, "img-0.jpeg");
        assert!(pages[2].images.is_empty());
    }

    #[test]
    fn test_provider_requires_api_key() {
        let config = Config::default();
        assert!(MistralOcrProvider::new(&config, reqwest::Client::new()).is_err());
    }
}
