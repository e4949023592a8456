//! LM Studio control-surface plugin.
//!
//! Bridges a button controller host (Stream Deck style, JSON over WebSocket)
//! to a local LM Studio server:
//! Host → Transport → Router → Action → LM Studio / `lms` / clipboard → Host
//!
//! # Architecture
//!
//! - **Transport**: one WebSocket link to the host with registration and
//!   automatic reconnection (`deck::transport`)
//! - **Router**: decodes host events, keeps the instance registry and
//!   dispatches key presses (`deck::router`)
//! - **Actions**: one orchestrator per button kind (`actions`)
//! - **LM Studio**: REST client with load-request negotiation and `lms`
//!   server control (`lmstudio`)
//! - **Session**: owns all of the above with a start/stop lifecycle (`session`)

pub mod actions;
pub mod clipboard;
pub mod config;
pub mod deck;
pub mod error;
pub mod launch;
pub mod lmstudio;
pub mod session;

pub use config::PluginConfig;
pub use error::{PluginError, Result};
pub use launch::LaunchArgs;
pub use session::{Collaborators, PluginSession};
