use crate::error::IngestError;
use crate::models::PageImage;
use crate::traits::{OcrClient, OcrEngine};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Runs the `tesseract` binary once per image, piping JPEG bytes through stdin.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    pub binary: PathBuf,
    pub language: String,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".to_string(),
        }
    }
}

pub struct TesseractClient {
    binary: PathBuf,
    language: String,
}

impl OcrEngine for TesseractEngine {
    type Client = TesseractClient;

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        if self.language.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "tesseract language is empty".to_string(),
            ));
        }
        Ok(TesseractClient {
            binary: self.binary.clone(),
            language: self.language.clone(),
        })
    }
}

impl OcrClient for TesseractClient {
    fn recognize(&mut self, image: &PageImage) -> Result<String, IngestError> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l"])
            .arg(&self.language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&image.bytes),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "tesseract exited with {} on page {}: {}",
                output.status,
                image.page,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        // a clean exit after a short read still means the image was cut off
        if let Err(error) = written {
            return Err(IngestError::OcrFailed(format!(
                "tesseract did not read the whole image of page {}: {error}",
                image.page
            )));
        }

        String::from_utf8(output.stdout).map_err(|error| {
            IngestError::OcrFailed(format!("tesseract output is not utf-8: {error}"))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest {
    image_base64: String,
    mime_type: String,
    page: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    text: Option<String>,
}

/// Multimodal OCR over HTTP, one image per request.
#[derive(Debug, Clone)]
pub struct HttpOcrEngine {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpOcrEngine {
    /// Reads `LLM_OCR_ENDPOINT` and the optional `LLM_OCR_API_KEY`.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("LLM_OCR_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|key| !key.is_empty());

        Some(Self {
            endpoint,
            api_key,
            timeout,
        })
    }
}

pub struct HttpOcrClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OcrEngine for HttpOcrEngine {
    type Client = HttpOcrClient;

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        let client = Client::builder().timeout(self.timeout).build()?;
        Ok(HttpOcrClient {
            client,
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
        })
    }
}

impl OcrClient for HttpOcrClient {
    fn recognize(&mut self, image: &PageImage) -> Result<String, IngestError> {
        let payload = LlmOcrRequest {
            image_base64: STANDARD.encode(&image.bytes),
            mime_type: image.format.mime_type().to_string(),
            page: image.page,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "multimodal OCR request to {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: LlmOcrResponse = response.json()?;
        payload_to_text(&payload, image.page)
    }
}

fn payload_to_text(payload: &LlmOcrResponse, page: usize) -> Result<String, IngestError> {
    if let Some(listed) = &payload.pages {
        let joined = listed
            .iter()
            .filter_map(|entry| entry.text.as_deref().map(str::trim))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if !joined.is_empty() {
            return Ok(joined);
        }
    }

    if let Some(raw_text) = &payload.text {
        return Ok(raw_text.trim().to_string());
    }

    Err(IngestError::OcrFailed(format!(
        "multimodal OCR response was empty for page {page}"
    )))
}

/// Runtime choice between the local and the HTTP OCR engine.
#[derive(Debug, Clone)]
pub enum OcrBackend {
    Tesseract(TesseractEngine),
    Http(HttpOcrEngine),
}

pub enum OcrBackendClient {
    Tesseract(TesseractClient),
    Http(HttpOcrClient),
}

impl OcrEngine for OcrBackend {
    type Client = OcrBackendClient;

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        match self {
            OcrBackend::Tesseract(engine) => engine.create_client().map(OcrBackendClient::Tesseract),
            OcrBackend::Http(engine) => engine.create_client().map(OcrBackendClient::Http),
        }
    }
}

impl OcrClient for OcrBackendClient {
    fn recognize(&mut self, image: &PageImage) -> Result<String, IngestError> {
        match self {
            OcrBackendClient::Tesseract(client) => client.recognize(image),
            OcrBackendClient::Http(client) => client.recognize(image),
        }
    }
}
