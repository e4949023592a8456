//! HTTP client for the LM Studio REST API.
//!
//! Every call is independent: nothing is cached between calls, so two
//! buttons pressed at once see the server as it is at that moment.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::negotiator::{LoadEndpoint, negotiate_load};
use super::types::{
    ApiError, ApiResponse, ApiResult, ChatMessage, ChatReply, ChatRequest, ChatRole, LoadConfig,
    LoadOutcome, ModelsResponse, ServerStatus,
};
use crate::config::{ChatConfig, LmStudioConfig};
use crate::deck::protocol::ModelListEntry;

const MODELS_PATH: &str = "/api/v1/models";
const LOAD_PATH: &str = "/api/v1/models/load";
const UNLOAD_PATH: &str = "/api/v1/models/unload";
const CHAT_PATH: &str = "/v1/chat/completions";

/// Stateless LM Studio API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LmStudioClient {
    base_url: String,
    chat: ChatConfig,
    http: reqwest::Client,
}

impl LmStudioClient {
    /// Create a client with the configured request timeout.
    pub fn new(config: &LmStudioConfig, chat: ChatConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("HTTP client build failed, requests have no timeout: {e}");
                reqwest::Client::new()
            });
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            chat,
            http,
        }
    }

    /// Client for `base_url` with default timeout and chat settings.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let config = LmStudioConfig {
            base_url: base_url.into(),
            ..LmStudioConfig::default()
        };
        Self::new(&config, ChatConfig::default())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> ApiResult<ApiResponse> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))?;
        read_response(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> ApiResult<ApiResponse> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))?;
        read_response(response).await
    }

    /// Query the model list.
    ///
    /// Any HTTP response means the server is running; an unreadable body
    /// just yields no models. Transport failures report `running = false`.
    pub async fn status(&self) -> ServerStatus {
        match self.get(MODELS_PATH).await {
            Ok(response) => {
                let models = if response.is_ok() {
                    serde_json::from_value::<ModelsResponse>(response.body)
                        .map(|r| r.models)
                        .unwrap_or_else(|e| {
                            tracing::debug!("unreadable model list: {e}");
                            Vec::new()
                        })
                } else {
                    tracing::debug!(status = response.status, "model list request rejected");
                    Vec::new()
                };
                ServerStatus::from_models(models)
            }
            Err(e) => {
                tracing::debug!("LM Studio not reachable: {e}");
                ServerStatus::not_running()
            }
        }
    }

    /// Load a model, degrading the request shape until the server accepts it.
    ///
    /// # Errors
    ///
    /// Returns the last rejection, or the first transport error.
    pub async fn load_model(
        &self,
        model_path: &str,
        config: Option<&LoadConfig>,
    ) -> ApiResult<LoadOutcome> {
        negotiate_load(self, model_path, config).await
    }

    /// Unload `instance_id`, or the first loaded instance when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NoModelsLoaded`] without sending anything when no
    /// instance is given and none is loaded.
    pub async fn unload_model(&self, instance_id: Option<&str>) -> ApiResult<Value> {
        let instance_id = match instance_id {
            Some(id) => id.to_owned(),
            None => match self.status().await.first_loaded() {
                Some(instance) => instance.id.clone(),
                None => return Err(ApiError::NoModelsLoaded),
            },
        };

        let response = self
            .post(UNLOAD_PATH, &json!({ "instance_id": instance_id }))
            .await?;
        if response.is_ok() {
            tracing::info!(instance_id = %instance_id, "model unloaded");
            Ok(response.body)
        } else {
            Err(ApiError::rejected(&response))
        }
    }

    /// Models for the property inspector's picker.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, rejection or an unreadable body.
    pub async fn list_models(&self) -> ApiResult<Vec<ModelListEntry>> {
        let response = self.get(MODELS_PATH).await?;
        if !response.is_ok() {
            return Err(ApiError::rejected(&response));
        }
        let models: ModelsResponse = serde_json::from_value(response.body)
            .map_err(|e| ApiError::Request(format!("unreadable model list: {e}")))?;
        Ok(models.models.iter().map(|m| m.to_list_entry()).collect())
    }

    /// Build the completion request body.
    #[must_use]
    pub fn chat_request(
        &self,
        message: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = system_prompt {
            messages.push(ChatMessage {
                role: ChatRole::System,
                content: prompt.to_owned(),
            });
        }
        messages.push(ChatMessage {
            role: ChatRole::User,
            content: message.to_owned(),
        });
        ChatRequest {
            model: model.unwrap_or(&self.chat.default_model).to_owned(),
            messages,
            temperature: self.chat.temperature,
            max_tokens: self.chat.max_tokens,
            stream: false,
        }
    }

    /// Non-streaming chat completion.
    ///
    /// # Errors
    ///
    /// Returns `server returned status N` on any non-success status, or the
    /// transport error.
    pub async fn chat(
        &self,
        message: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> ApiResult<ChatReply> {
        let request = self.chat_request(message, model, system_prompt);
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::Request(format!("encode chat request: {e}")))?;

        tracing::debug!(model = %request.model, "sending chat completion");
        let response = self.post(CHAT_PATH, &body).await?;
        if response.is_ok() {
            Ok(ChatReply { raw: response.body })
        } else {
            Err(ApiError::Rejected(format!(
                "server returned status {}",
                response.status
            )))
        }
    }
}

#[async_trait]
impl LoadEndpoint for LmStudioClient {
    async fn post_load(&self, body: &Value) -> ApiResult<ApiResponse> {
        self.post(LOAD_PATH, body).await
    }
}

async fn read_response(response: reqwest::Response) -> ApiResult<ApiResponse> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(|e| ApiError::from_reqwest(&e))?;
    Ok(ApiResponse::new(status, &text))
}
