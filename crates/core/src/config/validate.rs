use super::types::{AuthMethod, Config, NotifierBackend};
use super::ConfigError;

/// Validate configuration
/// Checks cross-field constraints that serde defaults cannot express:
/// - api_key present when auth method is "api_key"
/// - telegram section present when notifier backend is "telegram"
/// - non-empty credentials and sane scheduler timings
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_ref().is_none_or(|k| k.is_empty())
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key is required when auth.method is \"api_key\"".to_string(),
        ));
    }

    if config.fetcher.username.is_empty() || config.fetcher.password.is_empty() {
        return Err(ConfigError::ValidationError(
            "fetcher.username and fetcher.password must not be empty".to_string(),
        ));
    }

    if config.fetcher.base_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "fetcher.base_url must not be empty".to_string(),
        ));
    }

    if config.store.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "store.url must not be empty".to_string(),
        ));
    }

    if config.scheduler.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.poll_interval_secs must be greater than 0".to_string(),
        ));
    }

    // Zero delay would hammer the tracker; the pass throttle is mandatory.
    if config.scheduler.item_delay_ms == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.item_delay_ms must be greater than 0".to_string(),
        ));
    }

    if config.notifier.backend == NotifierBackend::Telegram {
        match &config.notifier.telegram {
            Some(t) if !t.token.is_empty() => {}
            _ => {
                return Err(ConfigError::ValidationError(
                    "notifier.telegram.token is required when notifier.backend is \"telegram\""
                        .to_string(),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[fetcher]
username = "user"
password = "pass"

[store]
url = "http://localhost:8081"
username = "admin"
password = "adminadmin"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_api_key_method_without_key_fails() {
        let mut config = valid_config();
        config.auth.method = AuthMethod::ApiKey;
        config.auth.api_key = None;
        assert!(validate_config(&config).is_err());

        config.auth.api_key = Some("secret".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_credentials_fail() {
        let mut config = valid_config();
        config.fetcher.password = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_item_delay_fails() {
        let mut config = valid_config();
        config.scheduler.item_delay_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_telegram_backend_without_token_fails() {
        let mut config = valid_config();
        config.notifier.backend = NotifierBackend::Telegram;
        config.notifier.telegram = None;
        assert!(validate_config(&config).is_err());
    }
}
