use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("login page response did not set a csrftoken cookie")]
    MissingCsrf,

    #[error("provider redirect did not carry a scope parameter")]
    MissingScope,

    #[error("missing authorization code in callback url")]
    MissingCode,

    #[error("provider has no openid configuration url")]
    MissingConfigurationUrl,

    /// The callback `state` did not match the one sent with the authorization
    /// request. Never retry on this.
    #[error("callback state does not match the authorization request")]
    InvalidState,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUrl(String),

    #[error("request body could not be encoded: {0}")]
    FormBodyEncodingFailed(String),

    #[error("user authentication failed: {0}")]
    AuthFailed(#[from] AuthFailure),

    #[error("invalid header: {name}={value}")]
    InvalidHeader { name: String, value: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },
}

impl OidcError {
    /// True when the user backed out of the identity provider's page.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::AuthFailed(AuthFailure::Cancelled))
    }

    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::InvalidState)
    }
}

/// Why a [`UserAgent`](crate::UserAgent) could not hand back a callback url.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("cancelled by user")]
    Cancelled,

    #[error("no callback received within {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::{AuthFailure, OidcError};

    #[test]
    fn cancellation_is_distinct_from_failure() {
        assert!(OidcError::from(AuthFailure::Cancelled).is_cancelled());
        assert!(!OidcError::from(AuthFailure::Failed("webview crashed".into())).is_cancelled());
        assert!(!OidcError::InvalidState.is_cancelled());
    }

    #[test]
    fn only_state_mismatch_is_a_security_event() {
        assert!(OidcError::InvalidState.is_security_event());
        for other in [
            OidcError::MissingCsrf,
            OidcError::MissingScope,
            OidcError::MissingCode,
            OidcError::MissingConfigurationUrl,
        ] {
            assert!(!other.is_security_event(), "{other}");
        }
    }
}
