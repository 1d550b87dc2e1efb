use std::fmt::Display;

use http::{HeaderMap, Method};
use url::Url;

use crate::types::Result;
use crate::ErrorKind;

/// A single API call to be dispatched by the connection manager.
///
/// Carries everything except authentication, which the manager attaches
/// from its session. The path is relative to the manager's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method of the call
    pub method: Method,

    /// Path relative to the base URL, e.g. `/core/projects`
    pub path: String,

    /// Query parameters appended to the URL
    pub query: Vec<(String, String)>,

    /// Optional JSON body
    pub body: Option<serde_json::Value>,

    /// Additional headers for this call only
    pub headers: HeaderMap,
}

impl ApiRequest {
    /// Instantiate a new `ApiRequest` without query, body, or extra headers
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// A `GET` request for the given path
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` request carrying a JSON body
    #[must_use]
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::POST, path)
        }
    }

    /// A `PATCH` request carrying a JSON body
    #[must_use]
    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::PATCH, path)
        }
    }

    /// A `DELETE` request for the given path
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Resolve this request against a base URL, appending the query
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidUrlHost`] if the base URL cannot carry
    /// path segments.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let mut url = join_url(base, &self.path)?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

impl Display for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Join a relative endpoint path onto a base URL, preserving any path the
/// base itself carries (unlike [`Url::join`], which resolves relative to the
/// parent of the last segment).
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ErrorKind::InvalidUrlHost)?;
        segments.pop_if_empty();
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
    }
    Ok(url)
}
