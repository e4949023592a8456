//! Plugin session: the transport, router and orchestrators wired together.
//!
//! A [`PluginSession`] owns every long-running task of the plugin. Starting
//! it dials the controller host; stopping it cancels the connection loop and
//! the router loop together. Key-press tasks already in flight are left to
//! finish on their own; their writes are dropped once the link is gone.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::ActionContext;
use crate::clipboard::{Clipboard, ShellClipboard};
use crate::config::PluginConfig;
use crate::deck::registry::RegistryHandle;
use crate::deck::router::MessageRouter;
use crate::deck::transport::{
    ConnectParams, ConnectionStatus, Dialer, Outbox, ReconnectPolicy, TransportClient,
    WebSocketDialer,
};
use crate::lmstudio::{LmStudioClient, LmsCli, ServerControl};

/// External collaborators of a session.
#[derive(Clone)]
pub struct Collaborators {
    pub dialer: Arc<dyn Dialer>,
    pub server: Arc<dyn ServerControl>,
    pub clipboard: Arc<dyn Clipboard>,
}

impl Collaborators {
    /// WebSocket dialer, `lms` CLI and OS clipboard.
    #[must_use]
    pub fn production(config: &PluginConfig) -> Self {
        Self {
            dialer: Arc::new(WebSocketDialer),
            server: Arc::new(LmsCli::new(&config.cli)),
            clipboard: Arc::new(ShellClipboard),
        }
    }
}

/// A running plugin.
pub struct PluginSession {
    cancel: CancellationToken,
    transport: TransportClient,
    router_task: JoinHandle<()>,
    ctx: Arc<ActionContext>,
}

impl PluginSession {
    /// Connect to the host and start dispatching events.
    pub fn start(params: ConnectParams, config: &PluginConfig, collaborators: Collaborators) -> Self {
        let cancel = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tracing::info!(
            endpoint = %params.endpoint,
            lmstudio = %config.lmstudio.base_url,
            "starting plugin session"
        );

        let transport = TransportClient::spawn(
            params,
            ReconnectPolicy::from(&config.reconnect),
            collaborators.dialer,
            inbound_tx,
            cancel.clone(),
        );

        let ctx = Arc::new(ActionContext {
            outbox: transport.outbox(),
            registry: RegistryHandle::new(),
            lmstudio: LmStudioClient::new(&config.lmstudio, config.chat.clone()),
            server: collaborators.server,
            clipboard: collaborators.clipboard,
            timings: config.actions.clone(),
        });

        let router = MessageRouter::new(Arc::clone(&ctx));
        let router_task = tokio::spawn(route_frames(router, inbound_rx, cancel.clone()));

        Self {
            cancel,
            transport,
            router_task,
            ctx,
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.transport.outbox()
    }

    #[must_use]
    pub fn registry(&self) -> &RegistryHandle {
        &self.ctx.registry
    }

    /// Request shutdown without waiting.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the connection and router loops to finish.
    pub async fn shutdown(self) {
        self.stop();
        self.transport.join().await;
        if let Err(e) = self.router_task.await {
            tracing::error!(error = %e, "router task ended abnormally");
        }
        tracing::info!("plugin session stopped");
    }
}

async fn route_frames(
    router: MessageRouter,
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = inbound_rx.recv() => frame,
        };
        match frame {
            Some(text) => router.handle_frame(&text),
            None => break,
        }
    }
    tracing::debug!("router loop finished");
}
