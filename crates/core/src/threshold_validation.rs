//! Shared threshold validation helpers.
//!
//! Range checks reused by the continuity model (emotion intensity,
//! relationship tension, lighting blend progress) and by the duration
//! limits of the segmenter.

use crate::error::CoreError;

/// Validate that a value falls within `[0.0, 1.0]`.
///
/// Returns a `CoreError::Validation` naming the field if out of range.
pub fn validate_unit_range(value: f64, name: &str) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate that a value falls within `[-1.0, 1.0]`.
pub fn validate_signed_unit_range(value: f64, name: &str) -> Result<(), CoreError> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{name} must be between -1.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate that a duration in seconds is finite and strictly positive.
pub fn validate_positive_duration(value: f64, name: &str) -> Result<(), CoreError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::Validation(format!(
            "{name} must be a positive number of seconds, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_values() {
        assert!(validate_unit_range(0.0, "test").is_ok());
        assert!(validate_unit_range(0.5, "test").is_ok());
        assert!(validate_unit_range(1.0, "test").is_ok());
    }

    #[test]
    fn rejects_below_zero() {
        assert!(validate_unit_range(-0.01, "test").is_err());
    }

    #[test]
    fn rejects_above_one() {
        assert!(validate_unit_range(1.01, "test").is_err());
    }

    #[test]
    fn signed_range_accepts_negative_tension() {
        assert!(validate_signed_unit_range(-1.0, "tension").is_ok());
        assert!(validate_signed_unit_range(0.9, "tension").is_ok());
        assert!(validate_signed_unit_range(-1.2, "tension").is_err());
    }

    #[test]
    fn error_message_names_the_field() {
        let err = validate_unit_range(2.0, "intensity").unwrap_err();
        assert!(err.to_string().contains("intensity"));
    }

    #[test]
    fn duration_must_be_positive_and_finite() {
        assert!(validate_positive_duration(0.5, "duration").is_ok());
        assert!(validate_positive_duration(0.0, "duration").is_err());
        assert!(validate_positive_duration(f64::NAN, "duration").is_err());
    }
}
