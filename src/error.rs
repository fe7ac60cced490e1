//! Error types for subscription resolution and pricing.
//!
//! Provides granular error kinds so callers can tell configuration problems
//! (a referenced plan code with no catalog entry) apart from upstream
//! collaborator failures, and so the resolver can downgrade the one failure
//! mode it tolerates (institution-lookup connectivity).

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SubscriptionError>;

/// Errors produced while resolving or pricing subscriptions.
///
/// This crate performs no retries itself; retry policy, if any, belongs to
/// the collaborators behind the traits in [`crate::sources`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// A referenced plan code (current or pending) has no catalog entry.
    ///
    /// This is a configuration error and aborts the whole computation.
    #[error("No plan found for plan code '{plan_code}'")]
    PlanNotFound { plan_code: String },

    /// A billing or subscription-store collaborator failed.
    #[error("Upstream failure during '{operation}': {message}")]
    Upstream { operation: String, message: String },

    /// A connectivity-kind failure from a collaborator.
    ///
    /// The resolver downgrades this to "no institutional licences" when it
    /// comes from the institution lookup; everywhere else it is fatal.
    #[error("Connection to '{service}' failed: {message}")]
    ConnectionFailed { service: String, message: String },

    /// The caller supplied something this crate cannot act on, e.g. an
    /// unsupported hosted-page type.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The account has no externally billed subscription, so no hosted page
    /// can be built for it.
    #[error("Account '{account_id}' has no externally billed subscription")]
    NoExternalSubscription { account_id: String },
}

impl SubscriptionError {
    /// Check if this is a configuration error (bad plan catalog wiring).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::PlanNotFound { .. })
    }

    /// Check if this error came from an upstream collaborator.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::ConnectionFailed { .. })
    }

    /// Check if this is the connectivity-kind failure the resolver may
    /// downgrade.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    /// Shorthand for an upstream failure.
    pub fn upstream(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a connectivity failure.
    pub fn connection_failed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
