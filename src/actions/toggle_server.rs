use super::ActionContext;

/// Two-state indicator values.
const STATE_STOPPED: u8 = 0;
const STATE_RUNNING: u8 = 1;

/// Start the server if it is down, stop it if it is up.
pub async fn toggle_server(ctx: &ActionContext, context: &str) {
    let button = ctx.button(context);
    let status = ctx.lmstudio.status().await;

    if status.running {
        tracing::info!("stopping LM Studio server");
        button.set_title("Stopping...");
        match ctx.server.stop().await {
            Ok(()) => {
                button.show_ok();
                button.set_state(STATE_STOPPED);
                button.set_title("Stopped");
            }
            Err(e) => {
                tracing::warn!("failed to stop server: {e}");
                button.show_alert();
                button.set_state(STATE_RUNNING);
                button.set_title("Failed");
            }
        }
    } else {
        tracing::info!("starting LM Studio server");
        button.set_title("Starting...");
        match ctx.server.start().await {
            Ok(()) => {
                button.show_ok();
                button.set_state(STATE_RUNNING);
                button.set_title("Running");
            }
            Err(e) => {
                tracing::warn!("failed to start server: {e}");
                button.show_alert();
                button.set_state(STATE_STOPPED);
                button.set_title("Failed");
            }
        }
    }
}

/// Indicator state for a server status.
#[must_use]
pub fn state_for(running: bool) -> u8 {
    if running { STATE_RUNNING } else { STATE_STOPPED }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn running_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn starts_when_server_is_down() {
        let mut harness = Harness::offline();
        toggle_server(&harness.ctx, "ctx").await;

        assert_eq!(harness.server.starts.load(Ordering::SeqCst), 1);
        assert_eq!(harness.server.stops.load(Ordering::SeqCst), 0);
        assert_eq!(
            summary(&harness.frames()),
            ["title:Starting...", "showOk", "state:1", "title:Running"]
        );
    }

    #[tokio::test]
    async fn failed_start_alerts_and_resets_state() {
        let mut harness = Harness::new(
            &unreachable_url(),
            FakeServer {
                fail: true,
                ..FakeServer::default()
            },
            FakeClipboard::default(),
        );
        toggle_server(&harness.ctx, "ctx").await;

        assert_eq!(
            summary(&harness.frames()),
            ["title:Starting...", "showAlert", "state:0", "title:Failed"]
        );
    }

    #[tokio::test]
    async fn stops_when_server_is_up() {
        let server = running_server().await;
        let mut harness = Harness::new(&server.uri(), FakeServer::default(), FakeClipboard::default());
        toggle_server(&harness.ctx, "ctx").await;

        assert_eq!(harness.server.starts.load(Ordering::SeqCst), 0);
        assert_eq!(harness.server.stops.load(Ordering::SeqCst), 1);
        assert_eq!(
            summary(&harness.frames()),
            ["title:Stopping...", "showOk", "state:0", "title:Stopped"]
        );
    }

    #[tokio::test]
    async fn failed_stop_keeps_running_state() {
        let server = running_server().await;
        let mut harness = Harness::new(
            &server.uri(),
            FakeServer {
                fail: true,
                ..FakeServer::default()
            },
            FakeClipboard::default(),
        );
        toggle_server(&harness.ctx, "ctx").await;

        assert_eq!(
            summary(&harness.frames()),
            ["title:Stopping...", "showAlert", "state:1", "title:Failed"]
        );
    }

    #[test]
    fn indicator_states() {
        assert_eq!(state_for(true), 1);
        assert_eq!(state_for(false), 0);
    }
}
