//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for values that
//! would make routing impossible: malformed gateway URLs, zero timeouts or
//! connection limits, empty classifier patterns and an empty API path.
//! Returns a list of [`ValidationError`] values with per-field suggestions.

use url::Url;

use super::model::Config;
use crate::error::ValidationError;

/// Validate the gateway URL. Returns `Ok(())` or a human-readable error.
pub fn validate_gateway_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

fn error(section: &str, field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        section: section.into(),
        field: field.into(),
        message: message.into(),
        suggestion: None,
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(ref url) = config.gateway.url {
        if let Err(msg) = validate_gateway_url(url) {
            let mut err = error("gateway", "url", msg);
            if !url.contains("://") {
                err.suggestion = Some(format!("did you mean 'https://{url}'?"));
            }
            errors.push(err);
        }
    }

    if config.gateway.timeout == 0 {
        errors.push(error("gateway", "timeout", "must be greater than zero"));
    }

    if config.direct.timeout == 0 {
        errors.push(error("direct", "timeout", "must be greater than zero"));
    }

    if config.direct.max_connections == 0 {
        errors.push(error(
            "direct",
            "max_connections",
            "must allow at least one connection per target",
        ));
    }

    if config.direct.fallback_to_gateway && config.gateway.url.is_none() {
        let mut err = error(
            "direct",
            "fallback_to_gateway",
            "fallback is enabled but no gateway url is configured",
        );
        err.suggestion = Some("set gateway.url or GATEWAY_URL".into());
        errors.push(err);
    }

    for (i, suffix) in config.classifier.private_suffixes.iter().enumerate() {
        if suffix.trim_start_matches('.').is_empty() {
            errors.push(error(
                "classifier",
                &format!("private_suffixes[{i}]"),
                "suffix cannot be empty",
            ));
        }
    }

    for (i, infix) in config.classifier.private_infixes.iter().enumerate() {
        if infix.trim_matches('.').is_empty() {
            errors.push(error(
                "classifier",
                &format!("private_infixes[{i}]"),
                "infix cannot be empty",
            ));
        }
    }

    if config.messages.api_path.trim_matches('/').is_empty() {
        let mut err = error("messages", "api_path", "api path cannot be empty");
        err.suggestion = Some("the hub default is 'health-data-hub/api/v1'".into());
        errors.push(err);
    }

    if config.messages.default_data_source.is_empty() {
        errors.push(error(
            "messages",
            "default_data_source",
            "default data source cannot be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let gateway = config.gateway.url.as_deref().unwrap_or("not configured");
    let fallback = if config.direct.fallback_to_gateway {
        "enabled"
    } else {
        "disabled"
    };

    let lines = [
        format!("  gateway:   {gateway}"),
        format!(
            "    timeout: {}ms, retries on 500: {} (delay {}ms)",
            config.gateway.timeout, config.gateway.max_retries, config.gateway.retry_delay
        ),
        format!(
            "  direct:    timeout {}ms, {} connections per target, fallback {fallback}",
            config.direct.timeout, config.direct.max_connections
        ),
        format!(
            "  private:   {} suffixes, {} infixes",
            config.classifier.private_suffixes.len(),
            config.classifier.private_infixes.len()
        ),
        format!(
            "  messages:  /{} (data source {}, hl7 line endings {:?})",
            config.messages.api_path.trim_matches('/'),
            config.messages.default_data_source,
            config.messages.hl7_line_endings
        ),
    ];

    format!("{} is valid\n{}", path, lines.join("\n"))
}
