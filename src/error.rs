//! Error types shared by registration, dispatch and the upgrade path.
//!
//! Registration failures ([`PatternError`], [`RegistrationError`]) are fatal
//! to startup. Request-time failures surface as [`DispatchError`], which keeps
//! the original cause intact so the server boundary can choose a status code.
//! A request that matches no route is not an error at all; see
//! [`crate::dispatcher::DispatchOutcome::NotFound`].

use std::fmt;

use crate::dispatcher::Phase;

/// A route pattern that cannot be compiled into a [`crate::template::PathTemplate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string was empty.
    Empty,
    /// Two `{name}` captures in one pattern share a name.
    DuplicateCapture {
        /// Normalized pattern
        pattern: String,
        /// The repeated capture name
        name: String,
    },
    /// A segment uses `{` or `}` but is not exactly `{name}`.
    MalformedCapture {
        /// Normalized pattern
        pattern: String,
        /// The offending segment
        segment: String,
    },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Empty => write!(f, "route pattern is empty"),
            PatternError::DuplicateCapture { pattern, name } => {
                write!(f, "route pattern '{pattern}' declares capture '{{{name}}}' twice")
            }
            PatternError::MalformedCapture { pattern, segment } => write!(
                f,
                "route pattern '{pattern}' has malformed segment '{segment}'. \
                 Captures must span a whole segment, e.g. /users/{{id}}"
            ),
        }
    }
}

impl std::error::Error for PatternError {}

/// Failure raised by a registration call on [`crate::router::Router`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The effective route pattern is invalid.
    Pattern(PatternError),
    /// Only GET, PUT, POST and DELETE routes can be registered.
    UnsupportedMethod {
        /// The rejected method
        method: String,
    },
    /// An upgrade binding already exists for this exact path.
    DuplicateUpgrade {
        /// Effective upgrade path
        path: String,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::Pattern(e) => write!(f, "{e}"),
            RegistrationError::UnsupportedMethod { method } => {
                write!(f, "cannot register route for unsupported method {method}")
            }
            RegistrationError::DuplicateUpgrade { path } => {
                write!(f, "upgrade path '{path}' is already registered")
            }
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Pattern(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PatternError> for RegistrationError {
    fn from(e: PatternError) -> Self {
        RegistrationError::Pattern(e)
    }
}

/// Signals that the *request* is malformed, as opposed to a server fault.
///
/// Handlers return it through `anyhow`:
///
/// ```rust
/// use panrouter::error::ValidationError;
///
/// fn check(session_id: Option<&str>) -> anyhow::Result<()> {
///     match session_id {
///         None => Err(ValidationError::new("sessionId is null").into()),
///         Some(_) => Ok(()),
///     }
/// }
/// assert!(check(None).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: {}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A filter or handler failed while serving a request.
///
/// The remaining pipeline was aborted. The boundary renders
/// [`DispatchError::Validation`] as a client error and everything else as an
/// internal error; see [`DispatchError::status`].
#[derive(Debug)]
pub enum DispatchError {
    /// A filter or handler rejected the request input.
    Validation {
        /// Request target
        target: String,
        /// Pipeline phase that raised the error
        phase: Phase,
        /// The original validation error
        source: ValidationError,
    },
    /// Any other filter or handler failure.
    Handler {
        /// Request target
        target: String,
        /// Pipeline phase that raised the error
        phase: Phase,
        /// The original error
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// Classify an error raised during `phase`.
    ///
    /// An error that is itself a [`ValidationError`] becomes
    /// [`DispatchError::Validation`].
    #[must_use]
    pub fn classify(target: &str, phase: Phase, err: anyhow::Error) -> Self {
        match err.downcast::<ValidationError>() {
            Ok(source) => DispatchError::Validation {
                target: target.to_string(),
                phase,
                source,
            },
            Err(source) => DispatchError::Handler {
                target: target.to_string(),
                phase,
                source,
            },
        }
    }

    /// HTTP status the boundary should answer with.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::Validation { .. } => 400,
            DispatchError::Handler { .. } => 500,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            DispatchError::Validation { phase, .. } | DispatchError::Handler { phase, .. } => {
                *phase
            }
        }
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, DispatchError::Validation { .. })
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Validation {
                target,
                phase,
                source,
            } => write!(f, "{source} (target {target}, phase {phase})"),
            DispatchError::Handler {
                target,
                phase,
                source,
            } => write!(f, "handler failed: {source} (target {target}, phase {phase})"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Validation { source, .. } => Some(source),
            DispatchError::Handler { source, .. } => Some(source.as_ref()),
        }
    }
}

/// An event was delivered to a [`crate::upgrade::Connection`] out of order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `message` arrived before `connect` completed or after `close`.
    NotOpen {
        /// Upgrade path of the connection
        path: String,
    },
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::NotOpen { path } => {
                write!(f, "connection on '{path}' is not open")
            }
        }
    }
}

impl std::error::Error for LifecycleError {}

/// Failure to reach a session through [`crate::session::SessionRegistry`].
#[derive(Debug)]
pub enum SessionError {
    /// No live session has this id.
    UnknownSession(crate::ids::ConnectionId),
    /// The transport refused the message.
    Delivery(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::UnknownSession(id) => write!(f, "no live session {id}"),
            SessionError::Delivery(e) => write!(f, "message delivery failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Delivery(e) => Some(e),
            SessionError::UnknownSession(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_validation_error() {
        let err: anyhow::Error = ValidationError::new("sessionId is too short").into();
        let d = DispatchError::classify("/call", Phase::Handling, err);
        assert!(d.is_validation());
        assert_eq!(d.status(), 400);
        assert_eq!(d.phase(), Phase::Handling);
    }

    #[test]
    fn test_classify_other_error_preserves_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let d = DispatchError::classify("/x", Phase::Filtering, anyhow::Error::new(io));
        assert!(!d.is_validation());
        assert_eq!(d.status(), 500);
        let source = std::error::Error::source(&d).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn test_pattern_error_display() {
        let e = PatternError::DuplicateCapture {
            pattern: "/a/{id}/{id}".into(),
            name: "id".into(),
        };
        assert_eq!(
            e.to_string(),
            "route pattern '/a/{id}/{id}' declares capture '{id}' twice"
        );
    }
}
