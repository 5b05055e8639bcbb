use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - A bot token is configured
/// - Concurrency and attempt counts are at least 1
/// - Size, duration and side limits are non-zero and consistent
/// - The encoding tool timeout is non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.telegram.token.trim().is_empty() {
        return invalid("telegram.token is required (set TOKEN)");
    }

    if config.dispatcher.max_concurrent_jobs == 0 {
        return invalid("dispatcher.max_concurrent_jobs must be at least 1");
    }

    let transform = &config.transform;
    if transform.max_input_bytes == 0 {
        return invalid("transform.max_input_bytes cannot be 0");
    }
    if transform.max_duration_secs == 0 {
        return invalid("transform.max_duration_secs cannot be 0");
    }
    if transform.target_square_side == 0 || transform.note_side == 0 {
        return invalid("transform sides cannot be 0");
    }
    if transform.note_side > transform.target_square_side {
        return invalid(&format!(
            "transform.note_side ({}) cannot exceed transform.target_square_side ({})",
            transform.note_side, transform.target_square_side
        ));
    }

    if config.converter.timeout_secs == 0 {
        return invalid("converter.timeout_secs cannot be 0");
    }

    if config.pipeline.retry.max_attempts == 0 {
        return invalid("pipeline.retry.max_attempts must be at least 1");
    }

    Ok(())
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}
