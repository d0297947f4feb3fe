//! Per-request orchestration: validate → temp file → OCR → mapping → envelope.

use crate::converter::{self, DocumentConverter};
use crate::error::ProcessingError;
use crate::mapper::ReportMapper;
use crate::schema::{ReportData, ReportType};
use crate::upload::TemporaryUpload;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, Instrument, Span};
use uuid::Uuid;

/// Content types accepted for the `file` field. Browsers and curl send
/// `application/octet-stream` when they cannot guess.
const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/x-pdf",
    "application/octet-stream",
];

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validating,
    Converting,
    Mapping,
    Succeeded,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Converting => "converting",
            Self::Mapping => "mapping",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A file received from the client.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct ProcessedReport {
    pub request_id: Uuid,
    pub filename: String,
    pub data: ReportData,
    pub processing_time: Duration,
}

/// Response envelope shared by both processing endpoints.
#[derive(Debug, Serialize)]
pub struct ProcessingResponse {
    pub success: bool,
    pub message: String,
    /// Seconds, success only.
    pub processing_time: Option<f64>,
    pub data: Option<ReportData>,
}

impl ProcessingResponse {
    pub fn success(report: ProcessedReport) -> Self {
        Self {
            success: true,
            message: format!(
                "Successfully processed {} report: {}",
                report.data.report_type().label(),
                report.filename
            ),
            processing_time: Some(report.processing_time.as_secs_f64()),
            data: Some(report.data),
        }
    }

    pub fn failure(err: &ProcessingError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            processing_time: None,
            data: None,
        }
    }
}

/// Orchestrates conversion and mapping for uploaded reports.
#[derive(Clone)]
pub struct ReportPipeline {
    converter: DocumentConverter,
    mapper: ReportMapper,
    upload_dir: Option<PathBuf>,
}

impl ReportPipeline {
    pub fn new(
        converter: DocumentConverter,
        mapper: ReportMapper,
        upload_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            converter,
            mapper,
            upload_dir,
        }
    }

    /// Run one upload through every stage. Failures are logged here with the
    /// request id and the stage they happened in.
    pub async fn process(
        &self,
        request_id: Uuid,
        upload: Upload,
        report_type: ReportType,
    ) -> Result<ProcessedReport, ProcessingError> {
        async move {
            let started = Instant::now();
            let mut stage = Stage::Received;
            info!(
                filename = upload.filename.as_deref().unwrap_or("<none>"),
                bytes = upload.data.len(),
                "Received {} report",
                report_type.label()
            );

            match self.run(upload, report_type, &mut stage).await {
                Ok((filename, data)) => {
                    stage = Stage::Succeeded;
                    let processing_time = started.elapsed();
                    info!(
                        %stage,
                        "Successfully processed {} in {:.2} seconds",
                        filename,
                        processing_time.as_secs_f64()
                    );
                    Ok(ProcessedReport {
                        request_id,
                        filename,
                        data,
                        processing_time,
                    })
                }
                Err(err) => {
                    error!(
                        failed_stage = %stage,
                        kind = err.kind(),
                        "Error processing {} report: {}",
                        report_type.label(),
                        err
                    );
                    stage = Stage::Failed;
                    info!(
                        %stage,
                        "Request finished after {:.2} seconds",
                        started.elapsed().as_secs_f64()
                    );
                    Err(err)
                }
            }
        }
        .instrument(request_span(request_id, report_type))
        .await
    }

    async fn run(
        &self,
        upload: Upload,
        report_type: ReportType,
        stage: &mut Stage,
    ) -> Result<(String, ReportData), ProcessingError> {
        *stage = Stage::Validating;
        let filename = validate_upload(&upload)?;

        *stage = Stage::Converting;
        let temp = TemporaryUpload::create(self.upload_dir.clone(), upload.data).await?;
        let result = self
            .convert_and_map(&temp, &filename, report_type, stage)
            .await;
        temp.close();

        result.map(|data| (filename, data))
    }

    async fn convert_and_map(
        &self,
        temp: &TemporaryUpload,
        filename: &str,
        report_type: ReportType,
        stage: &mut Stage,
    ) -> Result<ReportData, ProcessingError> {
        info!("Converting PDF to markdown ({} bytes on disk)", temp.size());
        let document = self.converter.convert_file(temp.path(), filename).await?;
        if document.is_empty() {
            return Err(ProcessingError::EmptyDocument);
        }

        *stage = Stage::Mapping;
        info!(
            "Extracting structured {} data from {} pages",
            report_type.label(),
            document.total_pages
        );
        self.mapper.map_report(&document.markdown, report_type).await
    }
}

/// Span carrying the request id for everything logged on behalf of one request.
pub fn request_span(request_id: Uuid, report_type: ReportType) -> Span {
    info_span!("report", %request_id, %report_type)
}

/// Check an upload before anything touches disk or the network.
/// Returns the filename to report against.
pub fn validate_upload(upload: &Upload) -> Result<String, ProcessingError> {
    if upload.data.is_empty() {
        return Err(ProcessingError::InvalidInput(
            "Uploaded file is empty".to_string(),
        ));
    }

    let filename = upload
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ProcessingError::InvalidInput("Uploaded file has no filename".to_string())
        })?;

    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ProcessingError::InvalidInput(
            "Only PDF files are supported".to_string(),
        ));
    }

    if let Some(content_type) = upload.content_type.as_deref() {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(ProcessingError::InvalidInput(format!(
                "Only PDF files are supported (got content type '{}')",
                content_type
            )));
        }
    }

    converter::ensure_pdf(&upload.data)?;
    Ok(filename.to_string())
}
