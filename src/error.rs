use thiserror::Error;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
///
/// Every fallible operation in the core maps onto exactly one of these variants, so callers
/// (the HTTP server, the CLI, tests) can branch on [`Error::kind`] without string matching.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input; the caller's fault.
    #[error("{0}")]
    Validation(String),

    /// A uniqueness rule was violated (e.g. duplicate email).
    #[error("{0}")]
    Conflict(String),

    /// Missing, malformed, or expired credential, or bad login.
    #[error("{0}")]
    Unauthorized(String),

    /// Valid credential but insufficient privilege or an unapproved account.
    #[error("{0}")]
    Forbidden(String),

    /// The referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The credential store or annotation catalog failed or timed out.
    #[error("{0}")]
    Upstream(String),
}

/// A copyable discriminant for [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Unauthorized,
    Forbidden,
    NotFound,
    Upstream,
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtKind;

        match err.kind() {
            JwtKind::ExpiredSignature => Self::Unauthorized("token expired".to_owned()),
            _ => Self::Unauthorized(format!("invalid token: {err}")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Upstream(format!("malformed upstream payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(Error::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(Error::unauthorized("x").kind(), ErrorKind::Unauthorized);
        assert_eq!(Error::forbidden("x").kind(), ErrorKind::Forbidden);
        assert_eq!(Error::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::upstream("x").kind(), ErrorKind::Upstream);
    }

    #[test]
    fn display_is_the_bare_message() {
        let err = Error::conflict("Email already registered");
        assert_eq!(err.to_string(), "Email already registered");
    }
}
