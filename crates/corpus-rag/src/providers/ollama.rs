//! Ollama client for embeddings and generation with retry logic

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::backend::{FragmentStream, ModelBackend};

/// Ollama API client with automatic retry
pub struct OllamaClient {
    /// HTTP client, pooled and shared by every caller
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// One line of a streamed `/api/generate` response
#[derive(Debug, Deserialize, PartialEq)]
pub struct StreamChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        // No client-wide timeout: it would also cap streamed answers
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Limit for unary requests, and for the gap between streamed chunks
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.config.max_retries;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::llm("Unknown error")))
    }

    async fn post_generate(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model: &self.config.generate_model,
            prompt,
            stream,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let mut builder = self.client.post(&url).json(&request);
        if !stream {
            builder = builder.timeout(self.timeout());
        }

        let response = tokio::time::timeout(self.timeout(), builder.send())
            .await
            .map_err(|_| {
                Error::llm(format!("Generation request timed out after {:?}", self.timeout()))
            })?
            .map_err(|e| Error::llm(format!("Generation request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::llm(format!(
                "Generation failed: HTTP {} - {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let url = url.as_str();
        let client = &self.client;
        let model = self.config.embed_model.as_str();
        let timeout = self.timeout();

        self.retry_request(move || async move {
            let request = EmbedRequest {
                model,
                prompt: text,
            };

            let response = client
                .post(url)
                .timeout(timeout)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::llm(format!("Embedding request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(Error::llm(format!(
                    "Embedding failed: HTTP {}",
                    response.status()
                )));
            }

            let embed_response: EmbedResponse = response
                .json()
                .await
                .map_err(|e| Error::llm(format!("Failed to parse embedding response: {}", e)))?;

            Ok(embed_response.embedding)
        })
        .await
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let this = self;
        self.retry_request(move || async move {
            let response = this.post_generate(prompt, false).await?;
            let generate_response: GenerateResponse = response
                .json()
                .await
                .map_err(|e| Error::llm(format!("Failed to parse generation response: {}", e)))?;
            Ok(generate_response.response)
        })
        .await
    }

    async fn generate(&self, prompt: &str) -> Result<FragmentStream> {
        tracing::debug!("Streaming generation with model: {}", self.config.generate_model);
        let response = self.post_generate(prompt, true).await?;
        let mut bytes = response.bytes_stream();
        let idle = self.timeout();

        let stream = async_stream::stream! {
            let mut decoder = NdjsonDecoder::default();

            loop {
                let chunk = match tokio::time::timeout(idle, bytes.next()).await {
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(e))) => {
                        yield Err(Error::llm(format!("Stream error: {}", e)));
                        return;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        yield Err(Error::llm(format!("No output from model for {:?}", idle)));
                        return;
                    }
                };

                for line in decoder.push(&chunk) {
                    match line {
                        Ok(StreamChunk { error: Some(message), .. }) => {
                            yield Err(Error::llm(message));
                            return;
                        }
                        Ok(StreamChunk { response, done, .. }) => {
                            if !response.is_empty() {
                                yield Ok(response);
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if let Some(line) = decoder.finish() {
                match line {
                    Ok(StreamChunk { error: Some(message), .. }) => yield Err(Error::llm(message)),
                    Ok(StreamChunk { response, .. }) if !response.is_empty() => yield Ok(response),
                    Ok(_) => {}
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.config.base_url);

        match self.client.get(&url).timeout(self.timeout()).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Splits a byte stream into newline-delimited JSON records.
///
/// Network chunks do not align with lines, so an incomplete tail is kept
/// until the next chunk completes it.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: BytesMut,
}

impl NdjsonDecoder {
    /// Feed a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamChunk>> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if let Some(parsed) = parse_line(&line[..pos]) {
                out.push(parsed);
            }
        }
        out
    }

    /// Decode whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<Result<StreamChunk>> {
        let rest = self.buf.split();
        parse_line(rest.chunk())
    }
}

fn parse_line(line: &[u8]) -> Option<Result<StreamChunk>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(line)
            .map_err(|e| Error::llm(format!("Malformed stream line: {}", e))),
    )
}
