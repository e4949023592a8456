//! Inbound event dispatch.
//!
//! The router is the only writer of the instance registry. Anything that
//! waits on the network (key presses, the toggle-server status probe, model
//! lists for the inspector) runs as a detached task so one slow button never
//! stalls frame processing.

use std::sync::Arc;

use super::protocol::{
    ActionKind, InboundEvent, InspectorRequest, OutboundCommand, models_data_payload,
};
use super::registry::ButtonInstance;
use super::settings::ButtonSettings;
use crate::actions::{self, ActionContext};

/// Decodes inbound frames and dispatches them.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    ctx: Arc<ActionContext>,
}

impl MessageRouter {
    #[must_use]
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ActionContext> {
        &self.ctx
    }

    /// Handle one raw text frame. Undecodable frames are logged and skipped.
    pub fn handle_frame(&self, frame: &str) {
        match InboundEvent::decode(frame) {
            Ok(event) => self.dispatch(event),
            Err(e) => tracing::warn!(error = %e, "skipping undecodable frame"),
        }
    }

    /// Handle one decoded event.
    pub fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::KeyDown {
                context,
                action,
                settings,
            } => self.on_key_down(context, action, settings),
            InboundEvent::WillAppear {
                context,
                action,
                device,
                settings,
            } => self.on_will_appear(context, action, device, settings),
            InboundEvent::WillDisappear { context } => {
                if self.ctx.registry.lock().disappear(&context).is_some() {
                    tracing::debug!(context = %context, "instance removed");
                }
            }
            InboundEvent::DidReceiveSettings {
                context,
                action,
                settings,
            } => {
                let known = self
                    .ctx
                    .registry
                    .lock()
                    .update_settings(&context, settings.clone());
                if !known {
                    tracing::debug!(context = %context, "settings for unknown instance");
                }
                self.apply_display_title(&context, action, &settings);
            }
            InboundEvent::SendToPlugin { context, request } => {
                self.on_inspector_request(context, request);
            }
            InboundEvent::Ignored { event } => {
                tracing::trace!(event = %event, "ignoring event");
            }
        }
    }

    fn on_key_down(&self, context: String, action: Option<ActionKind>, settings: ButtonSettings) {
        let Some(kind) = action else {
            tracing::debug!(context = %context, "key press for unknown action");
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            actions::run(&ctx, kind, &context, &settings).await;
        });
    }

    fn on_will_appear(
        &self,
        context: String,
        action: Option<ActionKind>,
        device: Option<String>,
        settings: ButtonSettings,
    ) {
        self.ctx.registry.lock().appear(
            &context,
            ButtonInstance {
                action,
                settings: settings.clone(),
                device,
            },
        );
        tracing::debug!(context = %context, "instance registered");

        if action == Some(ActionKind::ToggleServer) {
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                let status = ctx.lmstudio.status().await;
                ctx.button(&context)
                    .set_state(actions::state_for(status.running));
            });
        } else {
            self.apply_display_title(&context, action, &settings);
        }
    }

    /// Load-model and process-clipboard keys show their configured name.
    fn apply_display_title(
        &self,
        context: &str,
        action: Option<ActionKind>,
        settings: &ButtonSettings,
    ) {
        if !action.is_some_and(ActionKind::shows_display_name) {
            return;
        }
        if let Some(title) = display_title(settings) {
            self.ctx.button(context).set_title(title);
        }
    }

    fn on_inspector_request(&self, context: String, request: InspectorRequest) {
        match request {
            InspectorRequest::GetModels => {
                let ctx = Arc::clone(&self.ctx);
                tokio::spawn(async move {
                    let models = ctx.lmstudio.list_models().await.unwrap_or_else(|e| {
                        tracing::warn!("model list unavailable: {e}");
                        Vec::new()
                    });
                    ctx.outbox.send(&OutboundCommand::SendToPropertyInspector {
                        context,
                        payload: models_data_payload(&models),
                    });
                });
            }
            InspectorRequest::Other(event) => {
                tracing::trace!(event = %event, "ignoring inspector request");
            }
        }
    }
}

/// `model_name_display`, else `modelName`.
#[must_use]
pub fn display_title(settings: &ButtonSettings) -> Option<&str> {
    settings
        .text("model_name_display")
        .or_else(|| settings.text("modelName"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::actions::testing::*;
    use serde_json::json;

    fn router(harness: &Harness) -> MessageRouter {
        MessageRouter::new(Arc::clone(&harness.ctx))
    }

    fn frame(value: serde_json::Value) -> String {
        value.to_string()
    }

    #[tokio::test]
    async fn appear_then_disappear_tracks_instance() {
        let harness = Harness::offline();
        let router = router(&harness);

        router.handle_frame(&frame(json!({
            "event": "willAppear",
            "action": "com.custom.lmstudio.quickchat",
            "context": "c1",
            "device": "d1",
            "payload": {"settings": {"message": "Hi"}}
        })));
        let stored = harness.ctx.registry.get("c1").unwrap();
        assert_eq!(stored.action, Some(ActionKind::QuickChat));
        assert_eq!(stored.device.as_deref(), Some("d1"));

        router.handle_frame(&frame(json!({"event": "willDisappear", "context": "c1"})));
        assert!(!harness.ctx.registry.contains("c1"));
    }

    #[tokio::test]
    async fn load_model_appear_shows_display_name() {
        let mut harness = Harness::offline();
        let router = router(&harness);

        router.handle_frame(&frame(json!({
            "event": "willAppear",
            "action": "com.custom.lmstudio.loadmodel",
            "context": "c1",
            "payload": {"settings": {"modelName": "Qwen", "model_name_display": "Qwen 7B"}}
        })));
        assert_eq!(summary(&harness.frames()), ["title:Qwen 7B"]);
    }

    #[tokio::test]
    async fn quick_chat_appear_sets_no_title() {
        let mut harness = Harness::offline();
        router(&harness).handle_frame(&frame(json!({
            "event": "willAppear",
            "action": "com.custom.lmstudio.quickchat",
            "context": "c1",
            "payload": {"settings": {"modelName": "Qwen"}}
        })));
        assert!(harness.frames().is_empty());
    }

    #[tokio::test]
    async fn toggle_server_appear_reports_stopped_state() {
        let mut harness = Harness::offline();
        router(&harness).handle_frame(&frame(json!({
            "event": "willAppear",
            "action": "com.custom.lmstudio.toggleserver",
            "context": "t1",
            "payload": {"settings": {}}
        })));
        let state = harness.next_frame().await;
        assert_eq!(
            state,
            json!({"event": "setState", "context": "t1", "payload": {"state": 0}})
        );
    }

    #[tokio::test]
    async fn settings_for_unknown_instance_do_not_register_it() {
        let mut harness = Harness::offline();
        router(&harness).handle_frame(&frame(json!({
            "event": "didReceiveSettings",
            "action": "com.custom.lmstudio.processclipboard",
            "context": "ghost",
            "payload": {"settings": {"model_name_display": "Fixer"}}
        })));
        assert!(harness.ctx.registry.lock().is_empty());
        // The title rule still applies to the key on screen.
        assert_eq!(summary(&harness.frames()), ["title:Fixer"]);
    }

    #[tokio::test]
    async fn settings_update_replaces_registered_settings() {
        let harness = Harness::offline();
        let router = router(&harness);
        router.handle_frame(&frame(json!({
            "event": "willAppear",
            "action": "com.custom.lmstudio.loadmodel",
            "context": "c1",
            "payload": {"settings": {"modelPath": "a"}}
        })));
        router.handle_frame(&frame(json!({
            "event": "didReceiveSettings",
            "action": "com.custom.lmstudio.loadmodel",
            "context": "c1",
            "payload": {"settings": {"modelPath": "b"}}
        })));
        let stored = harness.ctx.registry.get("c1").unwrap();
        assert_eq!(stored.settings.text("modelPath"), Some("b"));
    }

    #[tokio::test]
    async fn get_models_answers_with_empty_list_when_offline() {
        let mut harness = Harness::offline();
        router(&harness).handle_frame(&frame(json!({
            "event": "sendToPlugin",
            "action": "com.custom.lmstudio.loadmodel",
            "context": "c1",
            "payload": {"event": "getModels"}
        })));
        let reply = harness.next_frame().await;
        assert_eq!(
            reply,
            json!({
                "event": "sendToPropertyInspector",
                "context": "c1",
                "payload": {"event": "modelsData", "models": []}
            })
        );
    }

    #[tokio::test]
    async fn key_down_runs_action_in_background() {
        let mut harness = Harness::offline();
        router(&harness).handle_frame(&frame(json!({
            "event": "keyDown",
            "action": "com.custom.lmstudio.serversettings",
            "context": "s1",
            "payload": {"settings": {}}
        })));
        let flash = harness.next_frame().await;
        assert_eq!(flash, json!({"event": "showOk", "context": "s1"}));
    }

    #[tokio::test]
    async fn garbage_frames_are_skipped() {
        let mut harness = Harness::offline();
        let router = router(&harness);
        router.handle_frame("{not json");
        router.handle_frame(r#"{"event":"keyDown"}"#);
        assert!(harness.frames().is_empty());
        assert!(harness.ctx.registry.lock().is_empty());
    }

    #[test]
    fn display_title_prefers_display_name() {
        let both = ButtonSettings::new()
            .with("modelName", "a")
            .with("model_name_display", "b");
        assert_eq!(display_title(&both), Some("b"));
        let name_only = ButtonSettings::new().with("modelName", "a");
        assert_eq!(display_title(&name_only), Some("a"));
        assert_eq!(display_title(&ButtonSettings::new()), None);
    }
}
