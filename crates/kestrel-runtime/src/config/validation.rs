//! Configuration validation utilities.

use tracing::Level;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BanConfig, GatewayConfig, KestrelConfig, LogOutput, LoggingConfig, PLACEHOLDER_TOKEN,
    RateLimitConfig, TaskConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &KestrelConfig) -> ConfigResult<()> {
    validate_gateway_config(&config.gateway)?;

    if config.dispatch.dedup_capacity == 0 {
        return Err(ConfigError::validation(
            "dispatch.dedup_capacity must be greater than 0",
        ));
    }

    validate_rate_limit_config(&config.rate_limit)?;
    validate_ban_config(&config.ban)?;
    validate_task_config(&config.tasks)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Non-fatal findings worth logging at startup.
pub fn config_warnings(config: &KestrelConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    match config.gateway.access_token.as_deref() {
        None | Some("") => warnings.push(
            "gateway.access_token is not set; connecting without authentication".to_string(),
        ),
        Some(PLACEHOLDER_TOKEN) => warnings.push(format!(
            "gateway.access_token is still the placeholder {PLACEHOLDER_TOKEN}; connecting without authentication"
        )),
        Some(_) => {}
    }

    if config.identity.self_id.is_none() && config.identity.names.is_empty() {
        warnings.push(
            "identity has no self_id or names; mentions are matched against the gateway-reported id only"
                .to_string(),
        );
    }

    warnings
}

fn validate_gateway_config(gateway: &GatewayConfig) -> ConfigResult<()> {
    validate_url(&gateway.ws_url, "ws")?;
    validate_url(&gateway.api_url, "http")?;

    if gateway.reconnect_delay_ms == 0 {
        return Err(ConfigError::validation(
            "gateway.reconnect_delay_ms must be greater than 0",
        ));
    }
    if gateway.connect_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "gateway.connect_timeout_ms must be greater than 0",
        ));
    }
    if gateway.request_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "gateway.request_timeout_ms must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_rate_limit_config(rate_limit: &RateLimitConfig) -> ConfigResult<()> {
    if rate_limit.window_ms == 0 {
        return Err(ConfigError::validation(
            "rate_limit.window_ms must be greater than 0",
        ));
    }
    if rate_limit.max_requests == 0 {
        return Err(ConfigError::validation(
            "rate_limit.max_requests must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_ban_config(ban: &BanConfig) -> ConfigResult<()> {
    if ban.path.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("ban.path"));
    }
    Ok(())
}

fn validate_task_config(tasks: &TaskConfig) -> ConfigResult<()> {
    if tasks.workers == 0 {
        return Err(ConfigError::validation("tasks.workers must be greater than 0"));
    }
    if tasks.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "tasks.queue_capacity must be greater than 0",
        ));
    }
    if tasks.task_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "tasks.task_timeout_ms must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.tracing_level().is_none() {
        return Err(ConfigError::validation(format!(
            "Invalid log level: {}. Valid values are: trace, debug, info, warn, error",
            logging.level
        )));
    }

    for (target, level) in &logging.filters {
        if level.parse::<Level>().is_err() && !level.eq_ignore_ascii_case("off") {
            return Err(ConfigError::validation(format!(
                "Invalid log level for {target}: {level}"
            )));
        }
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates a URL.
fn validate_url(url: &str, expected_scheme: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("url"));
    }

    let valid_schemes = match expected_scheme {
        "ws" => ["ws://", "wss://"],
        "http" => ["http://", "https://"],
        _ => return Err(ConfigError::validation("Unknown URL scheme type")),
    };

    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}
