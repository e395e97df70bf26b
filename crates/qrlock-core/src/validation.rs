//! Input constraints shared by the sealing API and the request service

use crate::error::ValidationError;
use crate::{MAX_MESSAGE_BYTES, MIN_PASSWORD_CHARS};

/// Check a message against the length constraints.
///
/// Length is the UTF-8 byte length, so multi-byte characters count more
/// than once.
pub fn check_message(message: &str) -> Result<(), ValidationError> {
    if message.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if message.len() > MAX_MESSAGE_BYTES {
        return Err(ValidationError::MessageTooLong(MAX_MESSAGE_BYTES));
    }
    Ok(())
}

/// Check a password against the minimum length
pub fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_CHARS));
    }
    Ok(())
}

/// Check a message and password together.
///
/// Missing inputs are reported before length problems, so an empty password
/// wins over an overlong message.
pub fn check_request(message: &str, password: &str) -> Result<(), ValidationError> {
    if message.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    check_message(message)?;
    check_password(password)
}
