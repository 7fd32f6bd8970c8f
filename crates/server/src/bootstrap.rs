use storefront_agent::{AssistantError, ShoppingAssistant};
use storefront_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub assistant: ShoppingAssistant,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("assistant startup failed: {0}")]
    Assistant(#[source] AssistantError),
}

#[allow(dead_code)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        catalog_command = %config.backends.catalog.command,
        payment_command = %config.backends.payment.command,
        "starting application bootstrap"
    );

    let assistant = ShoppingAssistant::start(&config).await.map_err(BootstrapError::Assistant)?;
    info!(
        event_name = "system.bootstrap.backends_ready",
        correlation_id = "bootstrap",
        "backend sessions established"
    );

    Ok(Application { config, assistant })
}
