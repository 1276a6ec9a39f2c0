//! Auth providers that decorate a [`RequestDescriptor`] with credentials.
//!
//! The set of providers is closed: basic credentials, bearer tokens, API keys
//! (header, query or cookie) and OAuth2. Static providers hold an optional
//! value and contribute nothing until it is set; the OAuth2 provider obtains
//! and caches an access token, then delegates to a static provider.

use crate::{oauth2::OAuth2, request::RequestDescriptor, Error, Result};
use http::header::AUTHORIZATION;
use std::fmt;
use std::sync::Arc;

/// Where an API key is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLocation {
    /// A request header named after the key.
    Header,
    /// A query parameter named after the key.
    Query,
    /// A cookie named after the key.
    Cookie,
}

/// HTTP basic credentials. Applied only when both parts are present.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthBasic {
    /// The user name; [`AuthProvider::set_value`] replaces it.
    pub username: Option<String>,
    /// The password.
    pub password: Option<String>,
}

impl AuthBasic {
    /// Creates complete basic credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }
}

impl fmt::Debug for AuthBasic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBasic")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A bearer token sent as `Authorization: Bearer <token>`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthBearer {
    /// The token.
    pub token: Option<String>,
}

impl AuthBearer {
    /// Creates a bearer provider holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

impl fmt::Debug for AuthBearer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBearer")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An API key placed in a header, query parameter or cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey {
    /// The header, parameter or cookie name.
    pub name: String,
    /// Where the key goes.
    pub location: KeyLocation,
    /// The key.
    pub value: Option<String>,
}

impl AuthKey {
    /// Creates an API key provider without a value.
    pub fn new(name: impl Into<String>, location: KeyLocation) -> Self {
        Self {
            name: name.into(),
            location,
            value: None,
        }
    }

    /// Sets the key.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthKey")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A named credential scheme that can decorate a request.
#[derive(Debug, Clone)]
pub enum AuthProvider {
    /// HTTP basic credentials.
    Basic(AuthBasic),
    /// Bearer token.
    Bearer(AuthBearer),
    /// API key.
    Key(AuthKey),
    /// OAuth2 token lifecycle; shared so every clone sees one token cache.
    OAuth2(Arc<OAuth2>),
}

impl AuthProvider {
    /// Sets the provider's value (user name, token or key).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] for OAuth2 providers, which manage
    /// their own token.
    pub fn set_value(&mut self, value: Option<String>) -> Result<()> {
        match self {
            AuthProvider::Basic(basic) => basic.username = value,
            AuthProvider::Bearer(bearer) => bearer.token = value,
            AuthProvider::Key(key) => key.value = value,
            AuthProvider::OAuth2(_) => {
                return Err(Error::UnsupportedOperation(
                    "an OAuth2 auth provider cannot be a request_mutator".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Applies the provider, refreshing an OAuth2 token with the blocking transport if needed.
    ///
    /// Must not be called from within an async runtime when an OAuth2 refresh
    /// may happen; use [`AuthProvider::add_to_request_async`] there.
    pub fn add_to_request(&self, descriptor: RequestDescriptor) -> Result<RequestDescriptor> {
        match self {
            AuthProvider::OAuth2(oauth) => oauth.add_to_request(descriptor),
            _ => self.apply_static(descriptor),
        }
    }

    /// Applies the provider, refreshing an OAuth2 token asynchronously if needed.
    pub async fn add_to_request_async(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        match self {
            AuthProvider::OAuth2(oauth) => oauth.add_to_request_async(descriptor).await,
            _ => self.apply_static(descriptor),
        }
    }

    /// Applies a static provider. A missing value leaves the descriptor unchanged.
    pub(crate) fn apply_static(&self, descriptor: RequestDescriptor) -> Result<RequestDescriptor> {
        match self {
            AuthProvider::Basic(AuthBasic {
                username: Some(username),
                password: Some(password),
            }) => descriptor.with_basic_auth(username, password),
            AuthProvider::Basic(_) => Ok(descriptor),
            AuthProvider::Bearer(AuthBearer { token: Some(token) }) => {
                descriptor.with_header(AUTHORIZATION.as_str(), format!("Bearer {token}"))
            }
            AuthProvider::Bearer(_) => Ok(descriptor),
            AuthProvider::Key(AuthKey {
                name,
                location,
                value: Some(value),
            }) => match location {
                KeyLocation::Header => descriptor.with_header(name, value),
                KeyLocation::Query => Ok(descriptor.with_query_param(name.clone(), value.as_str())),
                KeyLocation::Cookie => Ok(descriptor.with_cookie(name.clone(), value.clone())),
            },
            AuthProvider::Key(_) => Ok(descriptor),
            AuthProvider::OAuth2(_) => Err(Error::UnsupportedOperation(
                "an OAuth2 auth provider cannot be a request_mutator".to_string(),
            )),
        }
    }
}

impl From<AuthBasic> for AuthProvider {
    fn from(auth: AuthBasic) -> Self {
        AuthProvider::Basic(auth)
    }
}

impl From<AuthBearer> for AuthProvider {
    fn from(auth: AuthBearer) -> Self {
        AuthProvider::Bearer(auth)
    }
}

impl From<AuthKey> for AuthProvider {
    fn from(auth: AuthKey) -> Self {
        AuthProvider::Key(auth)
    }
}

impl From<OAuth2> for AuthProvider {
    fn from(auth: OAuth2) -> Self {
        AuthProvider::OAuth2(Arc::new(auth))
    }
}
