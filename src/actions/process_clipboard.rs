use std::time::Duration;

use super::ActionContext;
use crate::deck::settings::ButtonSettings;

const DEFAULT_TITLE: &str = "Clipboard Action";

/// Rewrite the clipboard through the model using the button's system prompt.
pub async fn process_clipboard(ctx: &ActionContext, context: &str, settings: &ButtonSettings) {
    let button = ctx.button(context);
    button.set_title("Reading...");

    let input = ctx.clipboard.read_text().await;
    if input.is_empty() {
        tracing::info!("clipboard is empty");
        button.show_alert();
        button.set_title("Empty");
        return;
    }

    let system_prompt = settings.text("system_prompt");
    let model = settings.text("model");
    tracing::info!(chars = input.chars().count(), "processing clipboard");
    button.set_title("LLM Processing...");

    let content = match ctx.lmstudio.chat(&input, model, system_prompt).await {
        Ok(reply) => reply.content().map(str::to_owned),
        Err(e) => {
            tracing::warn!("clipboard chat failed: {e}");
            None
        }
    };
    let Some(content) = content else {
        button.show_alert();
        button.set_title("Failed");
        return;
    };

    if let Err(e) = ctx.clipboard.write_text(&content).await {
        tracing::warn!("failed to write clipboard: {e}");
    }
    button.show_ok();
    button.set_title("Success");

    tokio::time::sleep(Duration::from_millis(ctx.timings.title_restore_ms)).await;
    // The button may have been removed while "Success" was showing.
    let Some(instance) = ctx.registry.get(context) else {
        return;
    };
    let title = instance
        .settings
        .text("model_name_display")
        .unwrap_or(DEFAULT_TITLE);
    button.set_title(title);
}
