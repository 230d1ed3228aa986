use crate::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that an interval or duration is greater than zero
    pub fn validate_positive(value: u64, field_name: &str) -> ConfigResult<()> {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Validate that a count lies in `1..=max`
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a ratio lies in `(0, 1]`
    pub fn validate_ratio(value: f64, field_name: &str) -> ConfigResult<()> {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be within (0, 1], got {value}"
            )));
        }
        Ok(())
    }

    /// Validate that `low < high` for a pair of thresholds
    pub fn validate_threshold_order(
        low: f64,
        high: f64,
        low_name: &str,
        high_name: &str,
    ) -> ConfigResult<()> {
        if low >= high {
            return Err(ConfigError::Validation(format!(
                "{low_name} ({low}) must be less than {high_name} ({high})"
            )));
        }
        Ok(())
    }

    /// Validate that `min <= max` for a pair of bounds
    pub fn validate_bounds(min: usize, max: usize, min_name: &str, max_name: &str) -> ConfigResult<()> {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "{min_name} ({min}) must not exceed {max_name} ({max})"
            )));
        }
        Ok(())
    }

    /// Validate that a value is one of the allowed options
    pub fn validate_one_of(value: &str, field_name: &str, allowed: &[&str]) -> ConfigResult<()> {
        if !allowed.contains(&value.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid {field_name}: {value}. Valid options: {allowed:?}"
            )));
        }
        Ok(())
    }

    /// Validate that a listen address has `host:port` form
    pub fn validate_socket_addr(value: &str, field_name: &str) -> ConfigResult<()> {
        value
            .parse::<std::net::SocketAddr>()
            .map(|_| ())
            .map_err(|e| ConfigError::Validation(format!("{field_name} is not a valid address: {e}")))
    }
}
