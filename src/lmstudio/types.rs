//! LM Studio REST API types.
//!
//! Response shapes are read leniently: every field the plugin does not need
//! is ignored and every field it does need has a default, because the server
//! API is not versioned.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::deck::protocol::ModelListEntry;
use crate::deck::settings::ButtonSettings;

// ── Errors ─────────────────────────────────────────────────────

/// Failure of an LM Studio API call.
///
/// The `Display` text is what a button shows in the log and what callers
/// compare against, so it is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Unload requested but nothing is loaded.
    #[error("No models loaded")]
    NoModelsLoaded,

    /// Server answered with a non-success status. Carries the body's
    /// `error` text or `server returned status N`.
    #[error("{0}")]
    Rejected(String),

    /// Connection refused / server not running.
    #[error("cannot reach LM Studio: {0}")]
    Unreachable(String),

    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other transport or decoding failure.
    #[error("request failed: {0}")]
    Request(String),
}

impl ApiError {
    /// Classify a reqwest error.
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }

    /// Build a rejection from a non-success response.
    #[must_use]
    pub fn rejected(response: &ApiResponse) -> Self {
        Self::Rejected(response.error_message())
    }
}

/// Result of an LM Studio API call.
pub type ApiResult<T> = Result<T, ApiError>;

// ── Raw responses ──────────────────────────────────────────────

/// Status code and parsed body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; a non-JSON body is kept as a JSON string, an empty
    /// body as an empty object.
    pub body: Value,
}

impl ApiResponse {
    /// Parse a raw body.
    #[must_use]
    pub fn new(status: u16, raw_body: &str) -> Self {
        let body = if raw_body.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw_body).unwrap_or_else(|_| Value::String(raw_body.to_owned()))
        };
        Self { status, body }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// The body's `error` text (`"error": "..."` or `"error": {"message": "..."}`),
    /// or a generic status message.
    #[must_use]
    pub fn error_message(&self) -> String {
        let detail = match self.body.get("error") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        };
        detail.unwrap_or_else(|| format!("server returned status {}", self.status))
    }
}

// ── Models ─────────────────────────────────────────────────────

/// Reference to a running instance of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: String,
}

/// A model known to the server, loaded or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub loaded_instances: Vec<InstanceRef>,
}

impl ModelDescriptor {
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.loaded_instances.is_empty()
    }

    /// Display name if set, otherwise the key.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.key)
    }

    /// Projection for the property inspector's model picker.
    #[must_use]
    pub fn to_list_entry(&self) -> ModelListEntry {
        ModelListEntry {
            id: self.key.clone(),
            name: self.name().to_owned(),
            is_loaded: self.is_loaded(),
        }
    }
}

/// `GET /api/v1/models` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

/// One running model instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedInstance {
    /// Running-instance id, used for unloading.
    pub id: String,
    /// Key of the owning model.
    pub model: String,
    pub display_name: Option<String>,
}

impl fmt::Display for LoadedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name.as_deref().unwrap_or(&self.id))
    }
}

/// Snapshot of the server as seen by one `status()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    pub running: bool,
    pub models: Vec<ModelDescriptor>,
    pub loaded_instances: Vec<LoadedInstance>,
}

impl ServerStatus {
    /// The server is down or unreachable.
    #[must_use]
    pub fn not_running() -> Self {
        Self::default()
    }

    /// Build from the model list, flattening loaded instances.
    #[must_use]
    pub fn from_models(models: Vec<ModelDescriptor>) -> Self {
        let loaded_instances = models
            .iter()
            .flat_map(|model| {
                model.loaded_instances.iter().map(|instance| LoadedInstance {
                    id: instance.id.clone(),
                    model: model.key.clone(),
                    display_name: model.display_name.clone(),
                })
            })
            .collect();
        Self {
            running: true,
            models,
            loaded_instances,
        }
    }

    /// First loaded instance in server order.
    #[must_use]
    pub fn first_loaded(&self) -> Option<&LoadedInstance> {
        self.loaded_instances.first()
    }
}

// ── Load configuration ─────────────────────────────────────────

/// Context length used when the button leaves it blank or zero.
pub const DEFAULT_CONTEXT_LENGTH: i64 = 2048;

/// Load settings derived from a load-model button.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadConfig {
    pub context_length: i64,
    pub gpu_layers: i64,
}

impl LoadConfig {
    /// Derive from button settings. `None` when the button asks to reuse
    /// the server's last settings.
    #[must_use]
    pub fn from_settings(settings: &ButtonSettings) -> Option<Self> {
        if settings.flag("useLastSettings") {
            return None;
        }
        Some(Self {
            context_length: settings
                .integer("contextLength")
                .filter(|n| *n != 0)
                .unwrap_or(DEFAULT_CONTEXT_LENGTH),
            gpu_layers: settings.integer("gpuLayers").unwrap_or(0),
        })
    }

    /// GPU offload ratio: layer count ÷ 100.
    #[must_use]
    pub fn gpu_offload_ratio(&self) -> f64 {
        self.gpu_layers as f64 / 100.0
    }
}

/// Successful model load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    /// Body of the accepted response.
    pub data: Value,
    /// The requested configuration was not applied as sent.
    pub used_fallback: bool,
}

// ── Chat ───────────────────────────────────────────────────────

/// Message role in a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// `POST /v1/chat/completions` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub stream: bool,
}

/// Completion response body.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub raw: Value,
}

impl ChatReply {
    /// `choices[0].message.content`, when present.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.raw
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
    }
}
