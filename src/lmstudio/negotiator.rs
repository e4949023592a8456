//! Model-load negotiation.
//!
//! LM Studio versions disagree on the shape of the load request. The
//! negotiator walks an ordered list of request shapes, richest first, and
//! stops at the first one the server accepts.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::types::{ApiError, ApiResponse, ApiResult, LoadConfig, LoadOutcome};

/// Something that accepts a load request body and returns the raw response.
#[async_trait]
pub trait LoadEndpoint: Send + Sync {
    /// POST `body` to the load endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures; any HTTP status is a
    /// successful exchange.
    async fn post_load(&self, body: &Value) -> ApiResult<ApiResponse>;
}

/// One request shape.
#[derive(Clone, Copy)]
pub struct LoadTier {
    pub name: &'static str,
    /// Builds the request body; `None` skips the tier.
    pub build: fn(&str, Option<&LoadConfig>) -> Option<Value>,
    /// Whether success on this tier means the configuration was not applied.
    pub used_fallback: bool,
}

impl std::fmt::Debug for LoadTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadTier")
            .field("name", &self.name)
            .field("used_fallback", &self.used_fallback)
            .finish()
    }
}

fn nested_config(model: &str, config: Option<&LoadConfig>) -> Option<Value> {
    let config = config?;
    Some(json!({
        "model": model,
        "config": {
            "context_length": config.context_length,
            "gpu_layers": config.gpu_layers,
            "gpu_offload": { "ratio": config.gpu_offload_ratio() },
        },
    }))
}

fn flat_config(model: &str, config: Option<&LoadConfig>) -> Option<Value> {
    let config = config?;
    Some(json!({
        "model": model,
        "context_length": config.context_length,
        "gpu_layers": config.gpu_layers,
    }))
}

fn model_only(model: &str, _config: Option<&LoadConfig>) -> Option<Value> {
    Some(json!({ "model": model }))
}

/// Request shapes in the order they are tried.
pub const LOAD_TIERS: [LoadTier; 3] = [
    LoadTier {
        name: "nested-config",
        build: nested_config,
        used_fallback: false,
    },
    LoadTier {
        name: "flat-config",
        build: flat_config,
        used_fallback: true,
    },
    LoadTier {
        name: "model-only",
        build: model_only,
        used_fallback: true,
    },
];

/// Load `model` through `endpoint`, degrading the request until one succeeds.
///
/// # Errors
///
/// Returns the last tier's rejection when every tier fails, or the first
/// transport error encountered.
pub async fn negotiate_load(
    endpoint: &dyn LoadEndpoint,
    model: &str,
    config: Option<&LoadConfig>,
) -> ApiResult<LoadOutcome> {
    negotiate_with(endpoint, &LOAD_TIERS, model, config).await
}

/// Like [`negotiate_load`] with an explicit tier list.
///
/// # Errors
///
/// See [`negotiate_load`].
pub async fn negotiate_with(
    endpoint: &dyn LoadEndpoint,
    tiers: &[LoadTier],
    model: &str,
    config: Option<&LoadConfig>,
) -> ApiResult<LoadOutcome> {
    let mut last_error: Option<ApiError> = None;

    for tier in tiers {
        let Some(body) = (tier.build)(model, config) else {
            tracing::debug!(tier = tier.name, "no load configuration; skipping tier");
            continue;
        };

        let response = endpoint.post_load(&body).await?;
        if response.is_ok() {
            tracing::info!(
                model,
                tier = tier.name,
                used_fallback = tier.used_fallback,
                "model loaded"
            );
            return Ok(LoadOutcome {
                data: response.body,
                used_fallback: tier.used_fallback,
            });
        }

        let err = ApiError::rejected(&response);
        tracing::warn!(
            model,
            tier = tier.name,
            status = response.status,
            "load rejected: {err}"
        );
        last_error = Some(err);
    }

    Err(last_error.unwrap_or_else(|| ApiError::Rejected("no load request was attempted".into())))
}
