use headers::authorization::Credentials;
use headers::Authorization;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::types::Result;
use crate::ErrorKind;

/// Header carrying the numeric user id of the session
const X_FV_USERID: HeaderName = HeaderName::from_static("x-fv-userid");

/// Header carrying the numeric org id of the session
const X_FV_ORGID: HeaderName = HeaderName::from_static("x-fv-orgid");

/// An authenticated API session, as returned by the `POST /session`
/// handshake.
///
/// The tokens are wrapped in [`SecretString`] so they are redacted in debug
/// output and zeroized when the session is dropped (e.g. on close).
/// The refresh token is carried along for callers that renew sessions
/// themselves; this crate never renews a session on its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    access_token: SecretString,
    refresh_token: SecretString,
    user_id: i64,
    org_id: i64,
}

impl Session {
    /// The user id this session is bound to
    #[must_use]
    pub const fn user_id(&self) -> i64 {
        self.user_id
    }

    /// The org id this session is bound to
    #[must_use]
    pub const fn org_id(&self) -> i64 {
        self.org_id
    }

    /// The refresh token issued alongside the access token
    #[must_use]
    pub const fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    /// The authentication headers every request of this session carries:
    /// `Authorization: Bearer <access token>`, `x-fv-userid` and
    /// `x-fv-orgid`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidSessionToken`] if the access token
    /// contains characters that are not valid in a bearer token.
    pub fn headers(&self) -> Result<HeaderMap> {
        let bearer = Authorization::bearer(self.access_token.expose_secret())
            .map_err(|_| ErrorKind::InvalidSessionToken)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer.0.encode());
        headers.insert(X_FV_USERID, HeaderValue::from(self.user_id));
        headers.insert(X_FV_ORGID, HeaderValue::from(self.org_id));
        Ok(headers)
    }
}
