//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest track or device identifier accepted from clients.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Validates that a track or device identifier is non-empty, bounded and free of
/// whitespace or control characters.
///
/// # Examples
///
/// ```ignore
/// validate_identifier("kitchen-speaker") // Ok
/// validate_identifier("")                // Err - empty
/// validate_identifier("living room")     // Err - whitespace
/// ```
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!(
                "Identifier must be between 1 and {MAX_IDENTIFIER_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("Identifier must not contain whitespace or control characters".into());
        return Err(err);
    }

    Ok(())
}
