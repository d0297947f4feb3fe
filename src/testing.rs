//! In-process stand-ins for the OCR and chat services, plus sample payloads.

use crate::llm::{LanguageModel, Message};
use crate::ocr::{OcrInput, OcrPage, OcrProvider, OcrResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

pub fn page(num: u32, markdown: &str) -> OcrPage {
    OcrPage {
        page_num: num,
        markdown: markdown.to_string(),
        images: Vec::new(),
    }
}

pub struct MockOcr {
    outcome: Result<Vec<OcrPage>, String>,
    calls: AtomicUsize,
}

impl MockOcr {
    pub fn with_pages(pages: Vec<OcrPage>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(pages),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_text(text: &str) -> Arc<Self> {
        Self::with_pages(vec![page(1, text)])
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OcrProvider for MockOcr {
    fn name(&self) -> &str {
        "mock_ocr"
    }

    async fn process(&self, _input: &OcrInput<'_>) -> anyhow::Result<OcrResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(pages) => Ok(OcrResult {
                pages: pages.clone(),
                provider_name: "mock_ocr".to_string(),
            }),
            Err(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }
}

pub struct MockModel {
    outcome: Result<String, String>,
    calls: AtomicUsize,
    messages: Mutex<Vec<Message>>,
}

impl MockModel {
    pub fn ok(response: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(response.into()),
            calls: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every message received so far, in order.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LanguageModel for MockModel {
    fn model_name(&self) -> &str {
        "mock_model"
    }

    async fn complete_json(&self, messages: Vec<Message>) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().extend(messages);
        match &self.outcome {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }
}

pub fn therapy_json() -> Value {
    json!({
        "patient_id": "PAT123",
        "therapy_type": "Chemotherapy",
        "administration_route": "Intravenous",
        "drugs_administered": [
            {"drug_name": "Docetaxel", "dosage": 75.0, "unit": "mg/m²"},
            {"drug_name": "Cyclophosphamide", "dosage": 600.0, "unit": "mg/m²"}
        ],
        "first_date_of_therapy": "2024-03-01",
        "number_of_cycles": 6,
        "cycle_interval_days": 21,
        "adverse_event_observed": true,
        "adverse_event_medication": "Ondansetron",
        "comment": null,
        "hospital_name": "City Hospital",
        "hospital_location": "Springfield"
    })
}

pub fn radiation_json() -> Value {
    json!({
        "patient_name": "Jane Doe",
        "test_therapy": "therapy",
        "radiation_type": "EBRT",
        "start_date": "2024-01-10",
        "end_date": "2024-01-24",
        "fractions": 10,
        "dosage": 30.0,
        "unit": "Gy",
        "area_treated": "Spine",
        "events": "Mild fatigue",
        "medication": null,
        "lab_name": "Oncology Center",
        "lab_location": "Boston",
        "comment": null
    })
}
