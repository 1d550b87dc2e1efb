use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Possible errors when interacting with `espalier`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The credentials keyfile could not be read from the given path
    #[error("Failed to read credentials file `{path}`: {1}", path = .0.display())]
    CredentialsNotFound(PathBuf, std::io::Error),

    /// The credentials keyfile could be read but not understood
    #[error("Invalid credentials file `{path}`: {1}", path = .0.display())]
    InvalidCredentials(PathBuf, String),

    /// The server rejected the session handshake
    #[error("Session handshake failed with status {status}")]
    SessionHandshake {
        /// HTTP status code returned by the session endpoint
        status: StatusCode,
    },

    /// The session endpoint answered with a body that could not be decoded
    #[error("Could not decode session handshake response")]
    InvalidSessionResponse(#[source] reqwest::Error),

    /// The session access token cannot be used as an authorization header
    #[error("Session access token is not a valid bearer token")]
    InvalidSessionToken,

    /// The connection manager has been closed; no further requests are accepted
    #[error("Connection manager is closed")]
    ManagerClosed,

    /// Reqwest network error
    #[error("Network error while trying to connect to an endpoint via reqwest")]
    NetworkRequest(#[source] reqwest::Error),

    /// A URL without a usable host or port was given
    #[error("URL is missing a host or port")]
    InvalidUrlHost,

    /// The given string cannot be parsed into a valid base URL
    #[error("Invalid base URL `{0}`: {1}")]
    InvalidBaseUrl(String, url::ParseError),

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// A request body could not be serialized to JSON
    #[error("Failed to serialize request body")]
    RequestBody(#[from] serde_json::Error),
}

impl ErrorKind {
    /// `true` if this error means the manager is no longer usable,
    /// as opposed to a failure of one individual call.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::ManagerClosed)
    }
}
