use crate::config::types::{HttpConfig, PipelineConfig, PipelineSection};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
    validate_pipeline_section(&config.pipeline)?;
    validate_http_config(&config.http)?;
    Ok(())
}

/// Validates pipeline identity and concurrency settings
fn validate_pipeline_section(section: &PipelineSection) -> Result<(), ConfigError> {
    validate_pipeline_name(&section.name)?;

    if section.max_in_flight < 1 || section.max_in_flight > 1000 {
        return Err(ConfigError::Validation(format!(
            "max-in-flight must be between 1 and 1000, got {}",
            section.max_in_flight
        )));
    }

    if section.refresh_interval_ms < 10 || section.refresh_interval_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "refresh-interval-ms must be between 10 and 60000, got {}",
            section.refresh_interval_ms
        )));
    }

    if section.slot_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "slot-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the default fetcher's client settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "connect-timeout-secs must be >= 1, got {}",
            config.connect_timeout_secs
        )));
    }

    Ok(())
}

/// Slot file names are derived from the pipeline name, so it has to be a
/// plain file-name fragment.
fn validate_pipeline_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "pipeline name cannot be empty".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "pipeline name must contain only alphanumeric characters, '-' and '_', got '{}'",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pipeline_name() {
        assert!(validate_pipeline_name("cifras").is_ok());
        assert!(validate_pipeline_name("run_2024-01").is_ok());

        assert!(validate_pipeline_name("").is_err());
        assert!(validate_pipeline_name("../escape").is_err());
        assert!(validate_pipeline_name("with space").is_err());
        assert!(validate_pipeline_name("dots.are.separators").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&PipelineConfig::default()).is_ok());
    }

    #[test]
    fn test_max_in_flight_bounds() {
        let mut config = PipelineConfig::default();

        config.pipeline.max_in_flight = 1;
        assert!(validate(&config).is_ok());

        config.pipeline.max_in_flight = 1001;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_refresh_interval_bounds() {
        let mut config = PipelineConfig::default();
        config.pipeline.refresh_interval_ms = 5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_http_timeouts() {
        let mut config = PipelineConfig::default();
        config.http.timeout_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = PipelineConfig::default();
        config.http.connect_timeout_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = PipelineConfig::default();
        config.http.user_agent = "   ".to_string();
        assert!(validate(&config).is_err());
    }
}
