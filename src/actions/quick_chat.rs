use super::ActionContext;
use crate::deck::settings::ButtonSettings;

/// Send the button's canned message and preview the reply on the key.
pub async fn quick_chat(ctx: &ActionContext, context: &str, settings: &ButtonSettings) {
    let button = ctx.button(context);
    let Some(message) = settings.text("message") else {
        tracing::info!(context, "quick-chat pressed without a message");
        button.show_alert();
        return;
    };
    let model = settings.text("model").or_else(|| settings.text("targetModel"));
    let copy_to_clipboard = settings.flag("copyToClipboard");

    tracing::info!(model = model.unwrap_or_default(), "sending quick chat");
    button.set_title("Chatting...");

    let reply = match ctx.lmstudio.chat(message, model, None).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("chat failed: {e}");
            button.show_alert();
            button.set_title("Error");
            return;
        }
    };

    button.show_ok();
    let Some(content) = reply.content() else {
        tracing::debug!("chat reply had no content");
        return;
    };

    if copy_to_clipboard {
        if let Err(e) = ctx.clipboard.write_text(content).await {
            tracing::warn!("failed to copy reply to clipboard: {e}");
        }
    }
    button.set_title(&preview(content, ctx.timings.preview_chars));
}

/// First `max_chars` characters of `text`.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
