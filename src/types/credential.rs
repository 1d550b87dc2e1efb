use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::types::Result;
use crate::ErrorKind;

/// An API key pair loaded from a keyfile.
///
/// The keyfile is a small TOML document:
///
/// ```toml
/// key = "fvpk_example"
/// secret = "fvsk_example"
/// ```
///
/// Credentials are immutable once loaded. The secret is wrapped in a
/// [`SecretString`] so it is redacted in debug output and zeroized on drop.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    key: String,
    secret: SecretString,
}

impl Credential {
    /// Create a credential from its parts.
    #[must_use]
    pub fn new(key: String, secret: SecretString) -> Self {
        Self { key, secret }
    }

    /// Load a credential from a TOML keyfile.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CredentialsNotFound`] if the file cannot be read
    /// and [`ErrorKind::InvalidCredentials`] if it cannot be parsed or a
    /// field is empty.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ErrorKind::CredentialsNotFound(path.to_path_buf(), e))?;

        let credential: Self = toml::from_str(&contents)
            .map_err(|e| ErrorKind::InvalidCredentials(path.to_path_buf(), e.to_string()))?;

        if credential.key.is_empty() || credential.secret.expose_secret().is_empty() {
            return Err(ErrorKind::InvalidCredentials(
                path.to_path_buf(),
                "`key` and `secret` must be non-empty".to_string(),
            ));
        }

        Ok(credential)
    }

    /// The public half of the key pair.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The secret half of the key pair.
    #[must_use]
    pub const fn secret(&self) -> &SecretString {
        &self.secret
    }
}
