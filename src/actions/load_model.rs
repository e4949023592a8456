use super::ActionContext;
use crate::deck::settings::ButtonSettings;
use crate::lmstudio::LoadConfig;

const DEFAULT_NAME: &str = "Load Model";

/// Load the button's model with its configured context and GPU settings.
pub async fn load_model(ctx: &ActionContext, context: &str, settings: &ButtonSettings) {
    let button = ctx.button(context);
    let Some(model_path) = settings.text("modelPath") else {
        tracing::info!(context, "load-model pressed without a model path");
        button.show_alert();
        return;
    };
    let model_name = settings.text("modelName").unwrap_or(DEFAULT_NAME);

    let config = LoadConfig::from_settings(settings);
    tracing::info!(
        model_path,
        custom_settings = config.is_some(),
        "loading model"
    );
    button.set_title("Loading...");

    match ctx.lmstudio.load_model(model_path, config.as_ref()).await {
        Ok(outcome) if outcome.used_fallback => {
            tracing::info!(model_path, "model loaded with server defaults");
            button.show_ok();
            button.set_title(&format!("{model_name} (default)"));
        }
        Ok(_) => {
            button.show_ok();
            button.set_title(model_name);
        }
        Err(e) => {
            tracing::warn!(model_path, "failed to load model: {e}");
            button.show_alert();
            button.set_title("Failed");
        }
    }
}
