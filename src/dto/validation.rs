//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::session::JOIN_CODE_LENGTH;

/// Validates that a join code is exactly six alphanumeric characters.
///
/// Codes are normalized to uppercase before lookup, so both cases are
/// accepted here.
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();
    if trimmed.len() != JOIN_CODE_LENGTH {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "join code must be exactly {JOIN_CODE_LENGTH} characters (got {})",
                trimmed.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("join code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}
