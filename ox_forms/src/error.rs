use thiserror::Error;

/// Failures surfaced by decoding, rendering and the form integrations.
#[derive(Error, Debug)]
pub enum FormError {
    /// The payload could not be parsed as a form definition.
    #[error("malformed form definition: {0}")]
    MalformedDefinition(String),

    /// A change referenced a field that is not present in the rendered form.
    #[error("field '{0}' is not present in the form")]
    MissingField(String),

    /// Form, prefill, captcha or option fetch failed.
    #[error("request to {url} failed: {reason}")]
    NetworkFailure { url: String, reason: String },

    /// Native constraint violation on an input.
    #[error("field '{field}' is invalid: {message}")]
    ValidationFailure { field: String, message: String },

    /// Captcha cannot be loaded (missing site key or submit button).
    #[error("captcha unavailable: {0}")]
    CaptchaUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FormError {
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        FormError::NetworkFailure {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Short stable label for log lines.
    pub fn as_label(&self) -> &'static str {
        match self {
            FormError::MalformedDefinition(_) => "malformed_definition",
            FormError::MissingField(_) => "missing_field",
            FormError::NetworkFailure { .. } => "network_failure",
            FormError::ValidationFailure { .. } => "validation_failure",
            FormError::CaptchaUnavailable(_) => "captcha_unavailable",
            FormError::Config(_) => "config",
        }
    }
}
