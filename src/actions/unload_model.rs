use super::ActionContext;

/// Unload the first loaded model instance.
pub async fn unload_model(ctx: &ActionContext, context: &str) {
    let button = ctx.button(context);
    let status = ctx.lmstudio.status().await;
    let Some(instance) = status.first_loaded() else {
        tracing::info!("no models currently loaded");
        button.show_alert();
        button.set_title("None loaded");
        return;
    };

    tracing::info!(instance = %instance, "unloading model");
    button.set_title("Unloading...");

    match ctx.lmstudio.unload_model(Some(&instance.id)).await {
        Ok(_) => {
            button.show_ok();
            button.set_title("Unloaded");
        }
        Err(e) => {
            tracing::warn!(instance_id = %instance.id, "failed to unload model: {e}");
            button.show_alert();
            button.set_title("Failed");
        }
    }
}
