use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use super::errors::ComposeError;
use super::prompt::build_prompt;
use super::types::{
    ApiErrorEnvelope, ComposeOutput, ComposeParams, Content, GeminiConfig, GenerateContentRequest,
    GenerateContentResponse, InlineData, ListModelsResponse, ModelInfo, Part,
};

const GEMINI_TIMEOUT: Duration = Duration::from_secs(60);
const GENERATE_CONTENT: &str = "generateContent";

/// Suggests message text from a prompt and/or image via the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(GEMINI_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub async fn compose(&self, params: &ComposeParams) -> Result<ComposeOutput, ComposeError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ComposeError::MissingApiKey);
        }
        let user_prompt = params.prompt();
        if user_prompt.is_none() && params.image.is_none() {
            return Err(ComposeError::EmptyRequest);
        }

        let mut parts = vec![Part {
            text: Some(build_prompt(user_prompt, params.image.is_some())),
            inline_data: None,
        }];
        if let Some(image) = &params.image {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: BASE64_STANDARD.encode(&image.data),
                }),
            });
        }
        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
        };

        let url = format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.model(),
            GENERATE_CONTENT
        );
        debug!("Calling Gemini: {} (image: {})", url, params.image.is_some());

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: GenerateContentResponse = response.json().await?;

        let text = body
            .candidates
            .into_iter()
            .flat_map(|candidate| candidate.content.parts)
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        if text.is_empty() {
            return Err(ComposeError::EmptyResponse);
        }

        Ok(ComposeOutput {
            text: text.to_string(),
            model: self.model().to_string(),
        })
    }

    /// Models available to this key that support `generateContent`.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ComposeError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ComposeError::MissingApiKey);
        }
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: ListModelsResponse = response.json().await?;

        Ok(body
            .models
            .into_iter()
            .filter(|model| {
                model
                    .supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_CONTENT)
            })
            .map(|model| ModelInfo {
                name: model
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&model.name)
                    .to_string(),
                display_name: model.display_name,
            })
            .collect())
    }
}

async fn ensure_success(response: Response) -> Result<Response, ComposeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or(body);
    Err(ComposeError::Api {
        status: status.as_u16(),
        message,
    })
}
