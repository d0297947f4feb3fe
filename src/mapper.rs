//! Extracted text → validated report, through the language model.

use crate::error::ProcessingError;
use crate::llm::{LanguageModel, Message};
use crate::schema::{self, ReportData, ReportType};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You extract structured data from medical reports. \
You answer with a single JSON object and nothing else: no prose, no markdown, no code fences.";

const THERAPY_HINTS: &str = "\
- This could be a chemotherapy, biological, targeted, hormonal or immunotherapy report.
- Extract every drug mentioned with its dosage and unit.
- Convert dates to YYYY-MM-DD format.
- Set adverse_event_observed to true if any side effects or adverse events are mentioned.";

const RADIATION_HINTS: &str = "\
- radiation_type: 'EBRT' is External Beam Radiation Therapy.
- test_therapy should typically be 'therapy' for radiation therapy reports.
- Convert dates to YYYY-MM-DD format.
- Extract the total dosage and its unit (commonly 'Gy' for Gray).
- area_treated should name the anatomical region.
- Include any adverse events or side effects mentioned.
- fractions is the number of treatment sessions.";

/// Maps document text onto one of the report schemas.
#[derive(Clone)]
pub struct ReportMapper {
    model: Arc<dyn LanguageModel>,
}

impl ReportMapper {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Map `markdown_text` using a textual report-type selector.
    pub async fn map(
        &self,
        markdown_text: &str,
        report_type: &str,
    ) -> Result<ReportData, ProcessingError> {
        let report_type: ReportType = report_type.parse()?;
        self.map_report(markdown_text, report_type).await
    }

    pub async fn map_report(
        &self,
        markdown_text: &str,
        report_type: ReportType,
    ) -> Result<ReportData, ProcessingError> {
        if markdown_text.trim().is_empty() {
            return Err(ProcessingError::EmptyDocument);
        }

        info!(
            "Starting {} extraction with {} ({} chars)",
            report_type.label(),
            self.model.model_name(),
            markdown_text.len()
        );

        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(build_prompt(markdown_text, report_type)),
        ];

        let started = Instant::now();
        let response = self.model.complete_json(messages).await.map_err(|e| {
            warn!(
                "Model call failed after {:.2}s: {:#}",
                started.elapsed().as_secs_f64(),
                e
            );
            ProcessingError::ModelService(format!("{:#}", e))
        })?;

        debug!("Raw model response length: {} chars", response.len());

        let value = parse_llm_json(&response)?;
        let data = schema::validate(report_type, &value)?;

        info!(
            "{} extraction completed in {:.2}s",
            report_type.label(),
            started.elapsed().as_secs_f64()
        );
        Ok(data)
    }
}

/// Build the user prompt for `report_type`. Deterministic for a given input.
pub fn build_prompt(markdown_text: &str, report_type: ReportType) -> String {
    let hints = match report_type {
        ReportType::Therapy => THERAPY_HINTS,
        ReportType::Radiation => RADIATION_HINTS,
    };

    format!(
        "Extract structured {label} report data from this markdown text. \
Return only a single JSON object containing every field below, using the stated types. \
Use null for optional fields that are not mentioned. Do not add any commentary.\n\n\
Fields:\n{fields}\n\
Important notes:\n{hints}\n\n\
Report:\n{text}",
        label = report_type.label(),
        fields = schema::describe_fields(report_type.fields()),
        hints = hints,
        text = markdown_text,
    )
}

/// Recover a JSON value from a model response.
///
/// Tries, in order: the whole response, a fenced code block, and the first
/// balanced `{...}` substring that parses.
pub fn parse_llm_json(response: &str) -> Result<Value, ProcessingError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ProcessingError::MalformedModelResponse(
            "empty response".to_string(),
        ));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            debug!("Recovered JSON from fenced code block");
            return Ok(value);
        }
    }

    let mut search_from = 0;
    while let Some(offset) = trimmed[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(candidate) = balanced_object(&trimmed[start..]) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                debug!("Recovered JSON object embedded at byte {}", start);
                return Ok(value);
            }
        }
        search_from = start + 1;
    }

    Err(ProcessingError::MalformedModelResponse(format!(
        "no JSON object found in: {}",
        trimmed.chars().take(200).collect::<String>()
    )))
}

fn fenced_block(response: &str) -> Option<&str> {
    if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(str::trim)
    } else if response.contains("```") {
        response.split("```").nth(1).map(str::trim)
    } else {
        None
    }
}

/// `text` starts with `{`; return the slice up to its matching `}`.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
