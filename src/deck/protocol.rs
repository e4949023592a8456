//! Controller host wire protocol.
//!
//! Frames are JSON objects. Inbound frames carry `event`, `context` (button
//! instance id), `action` (action UUID), `device` and `payload`. Outbound
//! frames carry `event`, `context` and an optional `payload`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::settings::ButtonSettings;

/// The fixed set of button behaviours this plugin provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ToggleServer,
    LoadModel,
    UnloadModel,
    ServerSettings,
    QuickChat,
    ProcessClipboard,
}

impl ActionKind {
    /// All action kinds, in manifest order.
    pub const ALL: [Self; 6] = [
        Self::ToggleServer,
        Self::LoadModel,
        Self::UnloadModel,
        Self::ServerSettings,
        Self::QuickChat,
        Self::ProcessClipboard,
    ];

    /// Render to the action UUID declared in the plugin manifest.
    #[must_use]
    pub fn as_uuid(self) -> &'static str {
        match self {
            Self::ToggleServer => "com.custom.lmstudio.toggleserver",
            Self::LoadModel => "com.custom.lmstudio.loadmodel",
            Self::UnloadModel => "com.custom.lmstudio.unloadmodel",
            Self::ServerSettings => "com.custom.lmstudio.serversettings",
            Self::QuickChat => "com.custom.lmstudio.quickchat",
            Self::ProcessClipboard => "com.custom.lmstudio.processclipboard",
        }
    }

    /// Parse an action UUID.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_uuid() == raw)
    }

    /// Whether the button title mirrors the configured display name.
    #[must_use]
    pub fn shows_display_name(self) -> bool {
        matches!(self, Self::LoadModel | Self::ProcessClipboard)
    }
}

/// Raw inbound frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl InboundEnvelope {
    /// Settings nested under `payload.settings`, empty when absent.
    #[must_use]
    pub fn settings(&self) -> ButtonSettings {
        ButtonSettings::from_value(self.payload.as_ref().and_then(|p| p.get("settings")))
    }
}

/// Request sent by the property inspector through `sendToPlugin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectorRequest {
    /// Ask for the model list to populate the model picker.
    GetModels,
    /// Anything else; ignored.
    Other(String),
}

impl InspectorRequest {
    fn from_payload(payload: Option<&Value>) -> Self {
        match payload.and_then(|p| p.get("event")).and_then(Value::as_str) {
            Some("getModels") => Self::GetModels,
            Some(other) => Self::Other(other.to_owned()),
            None => Self::Other(String::new()),
        }
    }
}

/// Decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    KeyDown {
        context: String,
        action: Option<ActionKind>,
        settings: ButtonSettings,
    },
    WillAppear {
        context: String,
        action: Option<ActionKind>,
        device: Option<String>,
        settings: ButtonSettings,
    },
    WillDisappear {
        context: String,
    },
    DidReceiveSettings {
        context: String,
        action: Option<ActionKind>,
        settings: ButtonSettings,
    },
    SendToPlugin {
        context: String,
        request: InspectorRequest,
    },
    /// Events this plugin does not handle (`deviceDidConnect`, `keyUp`, ...).
    Ignored {
        event: String,
    },
}

impl InboundEvent {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame is not a JSON object.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        let envelope: InboundEnvelope = serde_json::from_str(frame)?;
        Ok(Self::from_envelope(envelope))
    }

    /// Type an already-parsed envelope.
    #[must_use]
    pub fn from_envelope(envelope: InboundEnvelope) -> Self {
        let action = envelope.action.as_deref().and_then(ActionKind::parse);
        let settings = envelope.settings();
        let Some(context) = envelope.context.clone() else {
            return Self::Ignored {
                event: envelope.event,
            };
        };

        match envelope.event.as_str() {
            "keyDown" => Self::KeyDown {
                context,
                action,
                settings,
            },
            "willAppear" => Self::WillAppear {
                context,
                action,
                device: envelope.device,
                settings,
            },
            "willDisappear" => Self::WillDisappear { context },
            "didReceiveSettings" => Self::DidReceiveSettings {
                context,
                action,
                settings,
            },
            "sendToPlugin" => Self::SendToPlugin {
                context,
                request: InspectorRequest::from_payload(envelope.payload.as_ref()),
            },
            _ => Self::Ignored {
                event: envelope.event.clone(),
            },
        }
    }
}

/// `setTitle` target covering both the hardware key and the software view.
pub const TITLE_TARGET_BOTH: u8 = 0;

/// One entry of the model list sent to the property inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelListEntry {
    pub id: String,
    pub name: String,
    pub is_loaded: bool,
}

/// Outbound command addressed to one button instance.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    SetTitle {
        context: String,
        title: String,
    },
    SetState {
        context: String,
        state: u8,
    },
    ShowAlert {
        context: String,
    },
    ShowOk {
        context: String,
    },
    SendToPropertyInspector {
        context: String,
        payload: Value,
    },
}

impl OutboundCommand {
    /// Wire event name.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SetTitle { .. } => "setTitle",
            Self::SetState { .. } => "setState",
            Self::ShowAlert { .. } => "showAlert",
            Self::ShowOk { .. } => "showOk",
            Self::SendToPropertyInspector { .. } => "sendToPropertyInspector",
        }
    }

    /// Render to the wire JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let event = self.event_name();
        match self {
            Self::SetTitle { context, title } => json!({
                "event": event,
                "context": context,
                "payload": { "title": title, "target": TITLE_TARGET_BOTH },
            }),
            Self::SetState { context, state } => json!({
                "event": event,
                "context": context,
                "payload": { "state": state },
            }),
            Self::ShowAlert { context } | Self::ShowOk { context } => json!({
                "event": event,
                "context": context,
            }),
            Self::SendToPropertyInspector { context, payload } => json!({
                "event": event,
                "context": context,
                "payload": payload,
            }),
        }
    }
}

/// The one-time frame that identifies this plugin to the host.
#[must_use]
pub fn registration_frame(register_event: &str, plugin_uuid: &str) -> String {
    json!({ "event": register_event, "uuid": plugin_uuid }).to_string()
}

/// Payload answering an inspector `getModels` request.
#[must_use]
pub fn models_data_payload(models: &[ModelListEntry]) -> Value {
    json!({ "event": "modelsData", "models": models })
}
