//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, LogOutput, LoggingConfig, PollingConfig};

/// Largest batch a platform will hand out in one fetch.
const MAX_POLLING_LIMIT: u32 = 1000;

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_dispatcher_config(config)?;
    validate_polling_config(&config.polling)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_dispatcher_config(config: &CourierConfig) -> ConfigResult<()> {
    if let Some(id) = &config.dispatcher.router_id
        && id.trim().is_empty()
    {
        return Err(ConfigError::validation("Router ID cannot be blank"));
    }
    Ok(())
}

/// Validates polling settings.
fn validate_polling_config(polling: &PollingConfig) -> ConfigResult<()> {
    if !(1..=MAX_POLLING_LIMIT).contains(&polling.limit) {
        return Err(ConfigError::validation(format!(
            "Polling limit must be between 1 and {MAX_POLLING_LIMIT}, got {}",
            polling.limit
        )));
    }

    if polling.error_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Polling error delay must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid module name in logging filters: {module:?}"
            )));
        }
    }

    Ok(())
}
