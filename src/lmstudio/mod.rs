//! LM Studio integration: REST client, load negotiation and `lms` server control.

pub mod cli;
pub mod client;
pub mod negotiator;
pub mod types;

pub use cli::{ControlError, LmsCli, ServerControl};
pub use client::LmStudioClient;
pub use negotiator::{LOAD_TIERS, LoadEndpoint, LoadTier, negotiate_load};
pub use types::{
    ApiError, ApiResponse, ApiResult, ChatReply, LoadConfig, LoadOutcome, LoadedInstance,
    ModelDescriptor, ServerStatus,
};
