use thiserror::Error;

pub const SERVICE_UNAVAILABLE: &str = "Authentication service unavailable";

/// Failure of a single identity provider call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("{0}")]
    Rejected(String),
    /// Transport failure, timeout, or an unusable success body.
    #[error("Authentication service unavailable")]
    Unavailable,
}

/// Business errors for auth workflows
#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    /// Credentials or token rejected (login, refresh).
    #[error("{0}")]
    Unauthorized(String),
    /// Provider refused to create the account.
    #[error("{0}")]
    Rejected(String),
    #[error("No refresh token available")]
    MissingRefreshToken,
}

impl AuthError {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            AuthError::Validation(_) => 1001,
            AuthError::Unauthorized(_) => 1004,
            AuthError::Rejected(_) => 1005,
            AuthError::MissingRefreshToken => 1006,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_has_fixed_message() {
        assert_eq!(ProviderError::Unavailable.to_string(), SERVICE_UNAVAILABLE);
    }

    #[test]
    fn rejected_displays_provider_message() {
        assert_eq!(ProviderError::Rejected("Invalid login credentials".into()).to_string(), "Invalid login credentials");
        assert_eq!(AuthError::MissingRefreshToken.to_string(), "No refresh token available");
    }
}
