//! Validation for alert recipients and SMS bodies before they reach the modem.

/// Longest single-part SMS in the GSM 7-bit alphabet.
pub const MAX_SMS_CHARS: usize = 160;

/// Validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlertValidationError {
    #[error("Recipient is empty")]
    MissingRecipient,

    #[error("Recipient must be in international format (+ followed by 7-15 digits): {0}")]
    InvalidRecipient(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message is too long (maximum {max} characters, got {len})")]
    MessageTooLong { max: usize, len: usize },
}

/// Validate an international-format phone number (`+` then 7 to 15 digits).
/// Spaces and dashes used for readability are removed.
pub fn validate_recipient(recipient: &str) -> Result<String, AlertValidationError> {
    let compact: String = recipient
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect();
    if compact.is_empty() {
        return Err(AlertValidationError::MissingRecipient);
    }
    let digits = compact
        .strip_prefix('+')
        .ok_or_else(|| AlertValidationError::InvalidRecipient(recipient.to_string()))?;
    if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AlertValidationError::InvalidRecipient(recipient.to_string()));
    }
    Ok(compact)
}

/// Sanitize an SMS body: control characters (including Ctrl-Z and ESC, which would end or
/// cancel the send) are removed except newlines, then the length is checked.
pub fn sanitize_sms_body(body: &str) -> Result<String, AlertValidationError> {
    let sanitized: String = body
        .chars()
        .filter(|&c| !c.is_control() || c == '\n')
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return Err(AlertValidationError::EmptyMessage);
    }
    let len = trimmed.chars().count();
    if len > MAX_SMS_CHARS {
        return Err(AlertValidationError::MessageTooLong {
            max: MAX_SMS_CHARS,
            len,
        });
    }
    Ok(trimmed.to_string())
}
