//! Medical report extractor: PDF therapy and radiation reports in, validated
//! structured records out.
//!
//! PDFs go through Mistral OCR to page-segmented markdown, the markdown goes
//! through a chat model to JSON, and the JSON is validated against the report
//! schema before it is returned.

pub mod config;
pub mod converter;
pub mod error;
pub mod llm;
pub mod mapper;
pub mod mistral;
pub mod ocr;
pub mod pipeline;
pub mod schema;
pub mod server;
pub mod upload;

#[cfg(test)]
mod testing;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
