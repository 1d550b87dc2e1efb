mod base_url;
mod credential;
mod error;
mod request;
mod session;

pub use base_url::BaseUrl;
pub use credential::Credential;
pub use error::ErrorKind;
pub use request::ApiRequest;
pub(crate) use request::join_url;
pub use session::Session;

/// The espalier `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
