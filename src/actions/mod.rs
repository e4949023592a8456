//! Button action orchestrators.
//!
//! One orchestrator per [`ActionKind`]. Each runs to completion as its own
//! task, talks to LM Studio or the OS, and reports back to the button only
//! through [`Button`] feedback commands. Orchestrators never fail: every
//! error ends as an alert flash and, for most actions, a failure title.

mod load_model;
mod process_clipboard;
mod quick_chat;
mod toggle_server;
mod unload_model;

use std::sync::Arc;

use crate::clipboard::Clipboard;
use crate::config::ActionsConfig;
use crate::deck::protocol::{ActionKind, OutboundCommand};
use crate::deck::registry::RegistryHandle;
use crate::deck::settings::ButtonSettings;
use crate::deck::transport::{Delivery, Outbox};
use crate::lmstudio::{LmStudioClient, ServerControl};

pub use load_model::load_model;
pub use process_clipboard::process_clipboard;
pub use quick_chat::quick_chat;
pub use toggle_server::{state_for, toggle_server};
pub use unload_model::unload_model;

/// Everything an orchestrator may touch. Shared by all handler tasks.
pub struct ActionContext {
    pub outbox: Outbox,
    pub registry: RegistryHandle,
    pub lmstudio: LmStudioClient,
    pub server: Arc<dyn ServerControl>,
    pub clipboard: Arc<dyn Clipboard>,
    pub timings: ActionsConfig,
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("outbox", &self.outbox)
            .field("lmstudio", &self.lmstudio.base_url())
            .finish_non_exhaustive()
    }
}

impl ActionContext {
    /// Feedback handle for one button instance.
    #[must_use]
    pub fn button<'a>(&'a self, context: &'a str) -> Button<'a> {
        Button {
            outbox: &self.outbox,
            context,
        }
    }
}

/// Visual feedback addressed to one button instance.
#[derive(Debug, Clone, Copy)]
pub struct Button<'a> {
    outbox: &'a Outbox,
    context: &'a str,
}

impl Button<'_> {
    #[must_use]
    pub fn context(&self) -> &str {
        self.context
    }

    pub fn set_title(&self, title: &str) -> Delivery {
        self.outbox.send(&OutboundCommand::SetTitle {
            context: self.context.to_owned(),
            title: title.to_owned(),
        })
    }

    pub fn set_state(&self, state: u8) -> Delivery {
        self.outbox.send(&OutboundCommand::SetState {
            context: self.context.to_owned(),
            state,
        })
    }

    pub fn show_ok(&self) -> Delivery {
        self.outbox.send(&OutboundCommand::ShowOk {
            context: self.context.to_owned(),
        })
    }

    pub fn show_alert(&self) -> Delivery {
        self.outbox.send(&OutboundCommand::ShowAlert {
            context: self.context.to_owned(),
        })
    }
}

/// Run the orchestrator for `kind` on a key press.
pub async fn run(ctx: &ActionContext, kind: ActionKind, context: &str, settings: &ButtonSettings) {
    tracing::debug!(action = kind.as_uuid(), context, "key pressed");
    match kind {
        ActionKind::ToggleServer => toggle_server(ctx, context).await,
        ActionKind::LoadModel => load_model(ctx, context, settings).await,
        ActionKind::UnloadModel => unload_model(ctx, context).await,
        ActionKind::ServerSettings => server_settings(ctx, context),
        ActionKind::QuickChat => quick_chat(ctx, context, settings).await,
        ActionKind::ProcessClipboard => process_clipboard(ctx, context, settings).await,
    }
}

/// Acknowledge the press. The button exists to open the inspector.
pub fn server_settings(ctx: &ActionContext, context: &str) {
    ctx.button(context).show_ok();
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes and a frame-capturing harness for orchestrator tests.
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::clipboard::ClipboardError;
    use crate::lmstudio::ControlError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Scripted server control that counts calls.
    #[derive(Default)]
    pub struct FakeServer {
        pub fail: bool,
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
    }

    #[async_trait]
    impl ServerControl for FakeServer {
        async fn start(&self) -> Result<(), ControlError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.result()
        }

        async fn stop(&self) -> Result<(), ControlError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.result()
        }
    }

    impl FakeServer {
        fn result(&self) -> Result<(), ControlError> {
            if self.fail {
                Err(ControlError::Failed {
                    code: "status 1".into(),
                    stderr: "boom".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    /// In-memory clipboard.
    #[derive(Default)]
    pub struct FakeClipboard {
        pub contents: Mutex<String>,
        pub writes: AtomicUsize,
    }

    impl FakeClipboard {
        pub fn with_text(text: &str) -> Self {
            Self {
                contents: Mutex::new(text.to_owned()),
                writes: AtomicUsize::new(0),
            }
        }

        pub fn text(&self) -> String {
            self.contents.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clipboard for FakeClipboard {
        async fn read_text(&self) -> String {
            self.text().trim().to_owned()
        }

        async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.contents.lock().unwrap() = text.to_owned();
            Ok(())
        }
    }

    pub struct Harness {
        pub ctx: Arc<ActionContext>,
        pub server: Arc<FakeServer>,
        pub clipboard: Arc<FakeClipboard>,
        frames: mpsc::UnboundedReceiver<String>,
    }

    impl Harness {
        pub fn new(base_url: &str, server: FakeServer, clipboard: FakeClipboard) -> Self {
            let outbox = Outbox::new();
            let frames = outbox.attach();
            let server = Arc::new(server);
            let clipboard = Arc::new(clipboard);
            let ctx = Arc::new(ActionContext {
                outbox,
                registry: RegistryHandle::new(),
                lmstudio: LmStudioClient::with_base_url(base_url),
                server: server.clone(),
                clipboard: clipboard.clone(),
                timings: ActionsConfig::default(),
            });
            Self {
                ctx,
                server,
                clipboard,
                frames,
            }
        }

        /// Harness whose LM Studio URL refuses connections.
        pub fn offline() -> Self {
            Self::new(&unreachable_url(), FakeServer::default(), FakeClipboard::default())
        }

        /// Frames written since the last call.
        pub fn frames(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(text) = self.frames.try_recv() {
                out.push(serde_json::from_str(&text).unwrap());
            }
            out
        }

        /// Wait for the next frame written by a spawned task.
        pub async fn next_frame(&mut self) -> Value {
            let text = tokio::time::timeout(std::time::Duration::from_secs(5), self.frames.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("outbox channel closed");
            serde_json::from_str(&text).unwrap()
        }
    }

    /// A loopback URL with nothing listening.
    pub fn unreachable_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    /// `(event, title-or-state)` summary of frames, for compact assertions.
    pub fn summary(frames: &[Value]) -> Vec<String> {
        frames
            .iter()
            .map(|f| {
                let event = f["event"].as_str().unwrap_or_default();
                match event {
                    "setTitle" => format!("title:{}", f["payload"]["title"].as_str().unwrap_or_default()),
                    "setState" => format!("state:{}", f["payload"]["state"]),
                    other => other.to_owned(),
                }
            })
            .collect()
    }
}
