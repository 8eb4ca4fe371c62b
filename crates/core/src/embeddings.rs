use crate::error::IngestError;
use crate::traits::{EmbeddingClient, EmbeddingProvider};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Offline embedder: hashed character trigrams, L2-normalised.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl EmbeddingProvider for CharacterNgramEmbedder {
    type Client = CharacterNgramEmbedder;

    fn model_id(&self) -> String {
        format!("character-ngram-{}", self.dimensions.max(1))
    }

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        Ok(*self)
    }
}

impl EmbeddingClient for CharacterNgramEmbedder {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, IngestError> {
        Ok(self.embed_text(text))
    }
}

/// Settings for an OpenAI-compatible `/embeddings` endpoint. The API key is
/// resolved by the caller and passed in explicitly.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: Option<usize>,
    pub timeout: Duration,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            dimensions: None,
            timeout: Duration::from_secs(30),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

pub struct OpenAiEmbeddingClient {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for OpenAiEmbeddings {
    type Client = OpenAiEmbeddingClient;

    fn model_id(&self) -> String {
        match self.dimensions {
            Some(dimensions) => format!("openai:{}:{dimensions}", self.model),
            None => format!("openai:{}", self.model),
        }
    }

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        if self.api_key.trim().is_empty() {
            return Err(IngestError::MissingCredential(
                "OpenAI API key is empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "OpenAI model name is empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| {
                IngestError::MissingCredential("OpenAI API key is not a valid header".to_string())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?;

        Ok(OpenAiEmbeddingClient {
            client,
            endpoint: self.endpoint(),
            model: self.model.clone(),
            dimensions: self.dimensions,
        })
    }
}

impl EmbeddingClient for OpenAiEmbeddingClient {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, IngestError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };

        let response = self.client.post(&self.endpoint).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(IngestError::EmbeddingFailed(format!(
                "{} returned {status}: {body}",
                self.endpoint
            )));
        }

        let parsed: EmbeddingResponse = response.json()?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| IngestError::EmbeddingFailed("response carried no embedding".to_string()))
    }
}

/// Runtime choice between the OpenAI API and the offline embedder.
#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    OpenAi(OpenAiEmbeddings),
    CharacterNgram(CharacterNgramEmbedder),
}

pub enum EmbeddingBackendClient {
    OpenAi(OpenAiEmbeddingClient),
    CharacterNgram(CharacterNgramEmbedder),
}

impl EmbeddingProvider for EmbeddingBackend {
    type Client = EmbeddingBackendClient;

    fn model_id(&self) -> String {
        match self {
            EmbeddingBackend::OpenAi(provider) => provider.model_id(),
            EmbeddingBackend::CharacterNgram(provider) => provider.model_id(),
        }
    }

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        match self {
            EmbeddingBackend::OpenAi(provider) => {
                provider.create_client().map(EmbeddingBackendClient::OpenAi)
            }
            EmbeddingBackend::CharacterNgram(provider) => provider
                .create_client()
                .map(EmbeddingBackendClient::CharacterNgram),
        }
    }
}

impl EmbeddingClient for EmbeddingBackendClient {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, IngestError> {
        match self {
            EmbeddingBackendClient::OpenAi(client) => client.embed(text),
            EmbeddingBackendClient::CharacterNgram(client) => client.embed(text),
        }
    }
}
