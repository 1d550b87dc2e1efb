use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::types::Result;
use crate::ErrorKind;

/// Base URL for the United States region
const UNITED_STATES: &str = "https://api.filevine.io";

/// Base URL for the Canada region
const CANADA: &str = "https://api.filevine.ca";

/// The API origin all requests are made against.
///
/// Either one of the known regional endpoints or an arbitrary
/// absolute HTTP(S) origin override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseUrl {
    /// The United States region, `https://api.filevine.io`
    UnitedStates,
    /// The Canada region, `https://api.filevine.ca`
    Canada,
    /// An arbitrary origin, e.g. for testing against a local server
    Custom(Url),
}

impl BaseUrl {
    /// The origin as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::UnitedStates => UNITED_STATES,
            Self::Canada => CANADA,
            Self::Custom(url) => url.as_str(),
        }
    }

    /// The origin as a parsed [`Url`]
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidBaseUrl`] if the origin cannot be parsed.
    /// This cannot happen for the known regions.
    pub fn url(&self) -> Result<Url> {
        match self {
            Self::Custom(url) => Ok(url.clone()),
            _ => Url::parse(self.as_str())
                .map_err(|e| ErrorKind::InvalidBaseUrl(self.as_str().to_string(), e)),
        }
    }
}

impl Default for BaseUrl {
    fn default() -> Self {
        Self::UnitedStates
    }
}

impl FromStr for BaseUrl {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "us" | "united-states" | UNITED_STATES => Ok(Self::UnitedStates),
            "ca" | "canada" | CANADA => Ok(Self::Canada),
            _ => Url::parse(trimmed)
                .map(Self::Custom)
                .map_err(|e| ErrorKind::InvalidBaseUrl(s.to_string(), e)),
        }
    }
}

impl From<Url> for BaseUrl {
    fn from(url: Url) -> Self {
        Self::Custom(url)
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
