use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

pub(super) const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub(super) const DEFAULT_GEMINI_API_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_API_BASE_URL.to_string(),
        }
    }

    /// Reads `GEMINI_API_KEY`, `GEMINI_MODEL` and `GEMINI_API_BASE_URL`.
    /// Returns `None` when no API key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = env_var_non_empty("GEMINI_API_KEY")?;
        Some(Self {
            api_key,
            model: env_var_non_empty("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: env_var_non_empty("GEMINI_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE_URL.to_string()),
        })
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// An image sent inline with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageInput {
    /// MIME type is guessed from the file name; unknown extensions fall back to
    /// `application/octet-stream`.
    pub fn from_bytes(file_name: &str, data: Vec<u8>) -> Self {
        let mime_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self { mime_type, data }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_bytes(&file_name, data))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComposeParams {
    /// What the post should be about.
    pub prompt: Option<String>,
    pub image: Option<ImageInput>,
}

impl ComposeParams {
    pub(super) fn prompt(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeOutput {
    pub text: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
}

// Wire types for the generateContent REST API.

#[derive(Debug, Serialize)]
pub(super) struct GenerateContentRequest {
    pub(super) contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub(super) struct Content {
    #[serde(default)]
    pub(super) parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub(super) text: Option<String>,
    #[serde(
        rename = "inline_data",
        alias = "inlineData",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub(super) inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct InlineData {
    #[serde(alias = "mimeType")]
    pub(super) mime_type: String,
    pub(super) data: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct GenerateContentResponse {
    #[serde(default)]
    pub(super) candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Candidate {
    #[serde(default)]
    pub(super) content: Content,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListModelsResponse {
    #[serde(default)]
    pub(super) models: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ApiModel {
    pub(super) name: String,
    #[serde(default)]
    pub(super) display_name: Option<String>,
    #[serde(default)]
    pub(super) supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorEnvelope {
    pub(super) error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorBody {
    #[serde(default)]
    pub(super) message: String,
}
