//! Convert a PDF, or every PDF in a directory, to markdown and plain text.

use anyhow::{bail, Context, Result};
use clap::Parser;
use medical_report_extractor::config::Config;
use medical_report_extractor::converter::{markdown_to_text, DocumentConverter};
use medical_report_extractor::ocr::MistralOcrProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Pause between documents so batch runs stay under the OCR rate limit.
const BATCH_PAUSE: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(
    name = "pdf-to-markdown",
    version,
    about = "Convert PDF(s) to Markdown and plain text using Mistral OCR"
)]
struct Args {
    /// Input PDF file or directory containing PDF files
    #[arg(long = "input-pdf", alias = "input_pdf")]
    input_pdf: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;
    medical_report_extractor::init_tracing(&config.log_filter);

    let ocr = MistralOcrProvider::new(&config, config.http_client()?)?;
    let converter = DocumentConverter::new(Arc::new(ocr));

    if args.input_pdf.is_file() {
        let outputs = convert_one(&converter, &args.input_pdf).await?;
        println!("Successfully processed {}", args.input_pdf.display());
        for output in outputs {
            println!("  wrote {}", output.display());
        }
        return Ok(());
    }

    if !args.input_pdf.is_dir() {
        bail!(
            "{} is not a valid PDF file or directory",
            args.input_pdf.display()
        );
    }

    let pdf_files = list_pdfs(&args.input_pdf)?;
    println!("Found {} PDF files to process", pdf_files.len());

    let mut success_count = 0usize;
    let mut error_count = 0usize;
    for (i, pdf) in pdf_files.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(BATCH_PAUSE).await;
        }
        match convert_one(&converter, pdf).await {
            Ok(_) => {
                success_count += 1;
                println!("Successfully processed {}", pdf.display());
            }
            Err(e) => {
                error_count += 1;
                error!("Error processing {}: {:#}", pdf.display(), e);
                println!("Error processing {}: {:#}", pdf.display(), e);
            }
        }
    }

    println!("\nProcessing complete:");
    println!("Successfully processed: {} files", success_count);
    println!("Failed to process: {} files", error_count);
    Ok(())
}

/// Every `*.pdf` directly inside `dir`, sorted by name. A directory without
/// any is an error.
fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if path.is_file() && is_pdf {
            files.push(path);
        }
    }
    if files.is_empty() {
        bail!("No PDF files found in {}", dir.display());
    }
    files.sort();
    Ok(files)
}

/// Write `<stem>_with_images.md`, `<stem>_no_images.md` and `<stem>.txt`
/// next to `pdf`.
async fn convert_one(converter: &DocumentConverter, pdf: &Path) -> Result<Vec<PathBuf>> {
    let filename = pdf
        .file_name()
        .and_then(|n| n.to_str())
        .context("input path has no file name")?;
    let stem = pdf
        .file_stem()
        .and_then(|s| s.to_str())
        .context("input path has no file stem")?;
    let out_dir = pdf.parent().unwrap_or_else(|| Path::new("."));

    info!("Processing {}", pdf.display());
    let document = converter.convert_file(pdf, filename).await?;

    let outputs = [
        (
            out_dir.join(format!("{stem}_with_images.md")),
            document.markdown_with_images.clone(),
        ),
        (
            out_dir.join(format!("{stem}_no_images.md")),
            document.markdown.clone(),
        ),
        (
            out_dir.join(format!("{stem}.txt")),
            markdown_to_text(&document.markdown),
        ),
    ];

    let mut written = Vec::with_capacity(outputs.len());
    for (path, contents) in outputs {
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    info!(
        "Converted {} ({} pages, {} text chars)",
        filename, document.total_pages, document.text_chars
    );
    Ok(written)
}
