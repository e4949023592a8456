//! Startup arguments passed by the controller host.
//!
//! The host launches the plugin as
//! `plugin -port <port> -pluginUUID <uuid> -registerEvent <event> -info <json>`.
//! Flags use a single dash.

use crate::deck::transport::ConnectParams;
use crate::error::{PluginError, Result};

/// Connection parameters for the controller host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    /// Local port of the host's WebSocket server.
    pub port: u16,
    /// Identifier the host assigned to this plugin process.
    pub plugin_uuid: String,
    /// Event name to send in the registration frame.
    pub register_event: String,
    /// Opaque host/device description. Not interpreted.
    pub info: Option<String>,
}

impl LaunchArgs {
    /// Parse from an argument list (without the program name).
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Launch`] when `-port`, `-pluginUUID` or
    /// `-registerEvent` is missing, or the port is not a valid number.
    pub fn parse_from<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let port = flag_value(&args, "-port")
            .ok_or_else(|| PluginError::Launch("missing -port".to_owned()))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| PluginError::Launch(format!("invalid -port {port:?}: {e}")))?;
        let plugin_uuid = flag_value(&args, "-pluginUUID")
            .ok_or_else(|| PluginError::Launch("missing -pluginUUID".to_owned()))?
            .to_owned();
        let register_event = flag_value(&args, "-registerEvent")
            .ok_or_else(|| PluginError::Launch("missing -registerEvent".to_owned()))?
            .to_owned();
        let info = flag_value(&args, "-info").map(str::to_owned);

        Ok(Self {
            port,
            plugin_uuid,
            register_event,
            info,
        })
    }

    /// WebSocket endpoint of the controller host.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Transport parameters for this launch.
    #[must_use]
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            endpoint: self.endpoint(),
            plugin_uuid: self.plugin_uuid.clone(),
            register_event: self.register_event.clone(),
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let index = args.iter().position(|a| a == flag)?;
    args.get(index + 1)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}
