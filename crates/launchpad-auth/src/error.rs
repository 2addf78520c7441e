//! Identity provider error types
//!
//! Transport and provider faults stop here; drivers turn them into
//! [`crate::AuthOutcome::Failed`] or [`DriverFailure`] values.

/// Device authorization provider errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceFlowError {
    /// User has not approved the device yet
    #[error("authorization pending")]
    AuthorizationPending,

    /// Provider asks to poll less often
    #[error("slow down")]
    SlowDown,

    /// User rejected the request
    #[error("access denied by user")]
    AccessDenied,

    /// Device code is no longer valid
    #[error("device code expired")]
    ExpiredToken,

    /// Any other provider-reported error
    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },

    /// Network or decoding fault
    #[error("transport error: {0}")]
    Transport(String),

    /// Client-side misconfiguration
    #[error("configuration error: {0}")]
    Config(String),
}

impl DeviceFlowError {
    /// Answers that mean "ask again later"
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::AuthorizationPending | Self::SlowDown)
    }

    /// Map an OAuth error code (RFC 8628 names or provider exception names)
    #[must_use]
    pub fn from_code(code: &str, description: Option<String>) -> Self {
        match code {
            "authorization_pending" | "AuthorizationPendingException" => Self::AuthorizationPending,
            "slow_down" | "SlowDownException" => Self::SlowDown,
            "access_denied" | "AccessDeniedException" => Self::AccessDenied,
            "expired_token" | "ExpiredTokenException" => Self::ExpiredToken,
            other => Self::Provider {
                code: other.to_string(),
                description: description.unwrap_or_default(),
            },
        }
    }
}

impl From<reqwest::Error> for DeviceFlowError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Authorization-code exchange errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Code rejected (reused, expired or issued to another client)
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Provider answered with an unexpected status or body
    #[error("provider error: {0}")]
    Provider(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// A driver could not issue a challenge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DriverFailure(pub String);

impl From<DeviceFlowError> for DriverFailure {
    fn from(err: DeviceFlowError) -> Self {
        Self(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_oauth_codes() {
        assert!(DeviceFlowError::from_code("authorization_pending", None).is_pending());
        assert!(DeviceFlowError::from_code("SlowDownException", None).is_pending());
        assert_eq!(
            DeviceFlowError::from_code("access_denied", None),
            DeviceFlowError::AccessDenied
        );
        let other = DeviceFlowError::from_code("invalid_client", Some("bad secret".into()));
        assert!(!other.is_pending());
        assert!(other.to_string().contains("bad secret"));
    }
}
