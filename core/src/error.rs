//! Error types for the Keywhiz admin client.
//!
//! # Design
//! The server signals intent through a handful of well-known status codes.
//! Those seven codes map onto the closed `ErrorKind` set; code, kind and
//! message all live in one static table so classification and display can
//! never disagree. Any other status at or above 400 lands in
//! `UnexpectedStatus` with the raw code and body for debugging.

use thiserror::Error;

/// The classified failure kinds, one per well-known status code.
///
/// Declaration order must match `STATUS_TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    UnsupportedMediaType,
    Validation,
}

/// Status code, kind and human-readable message for every classified status.
const STATUS_TABLE: [(u16, ErrorKind, &str); 7] = [
    (400, ErrorKind::MalformedRequest, "Malformed request syntax from client (400)"),
    (401, ErrorKind::Unauthorized, "Not allowed to login, password may be incorrect (401)"),
    (403, ErrorKind::Forbidden, "Resource forbidden (403)"),
    (404, ErrorKind::NotFound, "Resource not found (404)"),
    (409, ErrorKind::Conflict, "Conflicting resource (409)"),
    (415, ErrorKind::UnsupportedMediaType, "Resource media type is incorrect or incompatible (415)"),
    (422, ErrorKind::Validation, "Malformed request semantics from client (422)"),
];

impl ErrorKind {
    /// Look up the kind for a status code, if it is one of the classified ones.
    pub fn from_status(status: u16) -> Option<Self> {
        STATUS_TABLE
            .iter()
            .find(|(code, _, _)| *code == status)
            .map(|(_, kind, _)| *kind)
    }

    pub fn status(self) -> u16 {
        self.entry().0
    }

    pub fn description(self) -> &'static str {
        self.entry().2
    }

    fn entry(self) -> &'static (u16, ErrorKind, &'static str) {
        // Rows are in declaration order.
        &STATUS_TABLE[self as usize]
    }
}

/// Errors returned by `KeywhizClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with one of the classified statuses.
    #[error("{}", .0.description())]
    Status(ErrorKind),

    /// The server answered with some other status >= 400.
    #[error("Unexpected status code on response: {status}")]
    UnexpectedStatus { status: u16, body: String },

    /// A required argument failed its local check; no request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The base URL or a resolved endpoint is not usable.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The transport failed before any status was received.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApiError::Status(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The HTTP status behind this error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status(kind) => Some(kind.status()),
            ApiError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    /// True for 401 and 403, where callers usually want to log in again.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self.kind(),
            Some(ErrorKind::Unauthorized) | Some(ErrorKind::Forbidden)
        )
    }
}
