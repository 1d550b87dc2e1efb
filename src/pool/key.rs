use std::fmt;

use url::Url;

use crate::types::Result;
use crate::ErrorKind;

/// A type-safe `(host, port)` identity of a pooled endpoint.
///
/// Requests with the same endpoint key compete for the same connection
/// slots; requests to different keys are fully independent. Hostnames are
/// normalized to lowercase so lookups are consistent.
///
/// # Examples
///
/// ```
/// use espalier::EndpointKey;
/// use url::Url;
///
/// let url = Url::parse("https://api.filevine.io/core/projects").unwrap();
/// let key = EndpointKey::try_from(&url).unwrap();
/// assert_eq!(key.host(), "api.filevine.io");
/// assert_eq!(key.port(), 443);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    host: String,
    port: u16,
}

impl EndpointKey {
    /// The normalized hostname
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, explicit or defaulted from the URL scheme
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl TryFrom<&Url> for EndpointKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;
        let port = url.port_or_known_default().ok_or(ErrorKind::InvalidUrlHost)?;

        Ok(EndpointKey {
            host: host.to_lowercase(),
            port,
        })
    }
}

impl TryFrom<Url> for EndpointKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        EndpointKey::try_from(&url)
    }
}

impl From<(&str, u16)> for EndpointKey {
    fn from((host, port): (&str, u16)) -> Self {
        EndpointKey {
            host: host.to_lowercase(),
            port,
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
