//! Authenticated access to the Mistral REST API, shared by the OCR and chat clients.

use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::{multipart::Form, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Longest slice of an error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Clone)]
pub struct MistralApi {
    client: Client,
    api_key: String,
    base: String,
}

impl MistralApi {
    pub fn new(config: &Config, client: Client) -> Result<Self> {
        let api_key = config
            .mistral_api_key
            .clone()
            .context("MISTRAL_API_KEY environment variable not set")?;
        Ok(Self {
            client,
            api_key,
            base: config.mistral_api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B, what: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).json(body);
        self.execute(request, what).await
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        what: &str,
    ) -> Result<T> {
        let request = self.client.post(self.url(path)).multipart(form);
        self.execute(request, what).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let request = self.client.get(self.url(path)).query(query);
        self.execute(request, what).await
    }

    /// Send with bearer auth; non-2xx statuses become errors carrying the body.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("{} response body unreadable", what))?;
        debug!("{} responded {} ({} bytes)", what, status, body.len());

        if !status.is_success() {
            anyhow::bail!("{} returned {}: {}", what, status, truncate(&body));
        }

        serde_json::from_str(&body).with_context(|| format!("{} response could not be decoded", what))
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
