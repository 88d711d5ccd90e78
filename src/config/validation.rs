use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, RateLimitConfig, SitemapConfig, UrlsConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_urls_config(&config.urls)?;
    validate_sitemap_config(&config.sitemap)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 || config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 10, got {}",
            config.max_retries
        )));
    }

    if config.concurrency < 1 || config.concurrency > 50 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 50, got {}",
            config.concurrency
        )));
    }

    if config.base_timeout_secs < 1 || config.base_timeout_secs > 120 {
        return Err(ConfigError::Validation(format!(
            "base_timeout_secs must be between 1 and 120, got {}",
            config.base_timeout_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.throttle_base_secs > config.throttle_cap_secs {
        return Err(ConfigError::Validation(format!(
            "throttle_base_secs ({}) cannot exceed throttle_cap_secs ({})",
            config.throttle_base_secs, config.throttle_cap_secs
        )));
    }

    Ok(())
}

fn validate_urls_config(config: &UrlsConfig) -> Result<(), ConfigError> {
    if config.max_length < 16 {
        return Err(ConfigError::Validation(format!(
            "max_length must be at least 16, got {}",
            config.max_length
        )));
    }

    for ext in &config.blocked_extensions {
        if ext.is_empty() || ext.starts_with('.') || !ext.chars().all(|c| c.is_alphanumeric()) {
            return Err(ConfigError::Validation(format!(
                "blocked extension '{}' must be a bare alphanumeric extension (e.g. 'pdf')",
                ext
            )));
        }
    }

    Ok(())
}

fn validate_sitemap_config(config: &SitemapConfig) -> Result<(), ConfigError> {
    if config.max_depth > 10 {
        return Err(ConfigError::Validation(format!(
            "sitemap max_depth must be at most 10, got {}",
            config.max_depth
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "sitemap timeout_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.screenshot_dir.is_empty() {
        return Err(ConfigError::Validation(
            "screenshot_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain exactly one @ with text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
