//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::access::normalize_email;

/// Validates that an email passes the same check the access gate applies.
///
/// # Examples
///
/// ```ignore
/// validate_email_address("fan@example.com") // Ok
/// validate_email_address("  ")              // Err - blank
/// validate_email_address("fan.example.com") // Err - no @
/// ```
pub fn validate_email_address(email: &str) -> Result<(), ValidationError> {
    if normalize_email(email).is_none() {
        let mut err = ValidationError::new("email_format");
        err.message = Some("Enter a valid email".into());
        return Err(err);
    }

    Ok(())
}
