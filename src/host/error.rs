//! Host API error types.
//!
//! Errors are classified by what the caller can do about them:
//!
//! - **Transient** errors are retriable (5xx, rate limits, network failures)
//! - **Permanent** errors require human intervention (most 4xx)
//! - **NotFound** means the addressed object does not exist
//! - **AlreadyExists** is a write conflict: the object the caller tried to
//!   create is already there, which release orchestration treats as reuse
//! - **PermissionDenied** means the token lacks access to the repository

use std::fmt;
use thiserror::Error;

/// The kind of host API error, categorized for retry and reuse decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    Transient,
    Permanent,
    NotFound,
    AlreadyExists,
    PermissionDenied,
}

impl HostErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, HostErrorKind::Transient)
    }
}

/// A host API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct HostApiError {
    pub kind: HostErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for HostApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "host API error (HTTP {}): {}", code, self.message),
            None => write!(f, "host API error: {}", self.message),
        }
    }
}

impl HostApiError {
    /// Creates an error of the given kind with no octocrab source.
    pub fn without_source(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient_without_source(message: impl Into<String>) -> Self {
        Self::without_source(HostErrorKind::Transient, message)
    }

    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self::without_source(HostErrorKind::Permanent, message)
    }

    /// The interpreter answered an effect with a response of the wrong shape.
    pub fn unexpected_response(effect: &str, response_kind: &str) -> Self {
        Self::permanent_without_source(format!(
            "unexpected {response_kind} response to {effect}"
        ))
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == HostErrorKind::AlreadyExists
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == HostErrorKind::NotFound
    }

    /// Categorizes an octocrab error.
    ///
    /// Status codes decide the kind where they are unambiguous; message
    /// patterns cover the cases GitHub reports with a generic code (rate
    /// limits on 403, duplicates on 422).
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = err.to_string();

        let kind = match status_code {
            Some(429) => HostErrorKind::Transient,
            Some(403) if is_rate_limit_error(&message) => HostErrorKind::Transient,
            Some(401) | Some(403) => HostErrorKind::PermissionDenied,
            Some(404) => HostErrorKind::NotFound,
            Some(409) => HostErrorKind::AlreadyExists,
            Some(422) if is_already_exists_message(&message) => HostErrorKind::AlreadyExists,
            Some(code) if (500..600).contains(&code) => HostErrorKind::Transient,
            Some(_) if is_transient_message(&message) => HostErrorKind::Transient,
            Some(_) => HostErrorKind::Permanent,
            None if is_network_error(&message) => HostErrorKind::Transient,
            None => HostErrorKind::Permanent,
        };

        Self {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }
}

/// Extracts the HTTP status code from an octocrab error, if present.
///
/// Structured GitHub errors carry the code directly. Other variants only
/// expose it through their rendered message, so fall back to scanning it;
/// returning `None` leads to conservative classification.
fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    if let octocrab::Error::GitHub { source, .. } = err {
        return Some(source.status_code.as_u16());
    }

    let err_str = err.to_string();
    if let Some(idx) = err_str.find("status: ") {
        let digits: String = err_str[idx + 8..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }

    [401u16, 403, 404, 409, 422, 429, 500, 502, 503]
        .into_iter()
        .find(|code| err_str.contains(&code.to_string()))
}

/// GitHub reports duplicates (an open pull request for the same head and
/// base, an existing tag or release) as 422 validation failures.
fn is_already_exists_message(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("already exists") || message_lower.contains("already_exists")
}

fn is_transient_message(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("base branch was modified") || message_lower.contains("try again")
}

fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("abuse detection")
}

fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_detection() {
        assert!(is_already_exists_message(
            "Validation Failed: A pull request already exists for acme:dev."
        ));
        assert!(is_already_exists_message("Reference already_exists"));
        assert!(!is_already_exists_message("No commits between master and dev"));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limit_error("API rate limit exceeded"));
        assert!(is_rate_limit_error("You have exceeded a secondary rate limit"));
        assert!(!is_rate_limit_error("Resource not accessible by integration"));
    }

    #[test]
    fn network_error_detection() {
        assert!(is_network_error("connection reset by peer"));
        assert!(is_network_error("request timed out"));
        assert!(!is_network_error("Not Found"));
    }

    #[test]
    fn only_transient_is_retriable() {
        assert!(HostErrorKind::Transient.is_retriable());
        for kind in [
            HostErrorKind::Permanent,
            HostErrorKind::NotFound,
            HostErrorKind::AlreadyExists,
            HostErrorKind::PermissionDenied,
        ] {
            assert!(!kind.is_retriable(), "{kind:?}");
        }
    }

    #[test]
    fn display_includes_status() {
        let mut err = HostApiError::permanent_without_source("boom");
        assert_eq!(err.to_string(), "host API error: boom");
        err.status_code = Some(422);
        assert_eq!(err.to_string(), "host API error (HTTP 422): boom");
    }
}
