//! OAuth2 token lifecycle: obtain, cache and refresh an access token, then hand
//! it to a static provider that places it on the request.
//!
//! The cache is a single slot guarded by a short-lived lock. The lock is never
//! held across a token-endpoint call, so concurrent refreshes may race; the last
//! one to finish wins the slot and every caller proceeds with the token it got.

use crate::{
    auth::{AuthBearer, AuthProvider},
    request::{join_url, RequestDescriptor},
    Error, Result,
};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use time::OffsetDateTime;

/// Lifetime assumed when the token response carries no integer expiry.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 600;

/// Seconds subtracted from the server-declared lifetime.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// How client credentials reach the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsLocation {
    /// Client id and secret as transport-level basic auth, omitted from the body.
    BasicAuthorizationHeader,
    /// Client id and secret as body fields.
    #[default]
    RequestBody,
}

/// Encoding of the token request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyContent {
    /// A JSON object.
    Json,
    /// URL-form fields; the scope is space-joined.
    #[default]
    Form,
}

/// The grant-specific part of a credential set.
#[derive(Clone, PartialEq, Eq)]
pub enum OAuth2Credentials {
    /// The `client_credentials` grant.
    ClientCredentials {
        /// Client id.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
    /// The resource-owner `password` grant.
    Password {
        /// Resource owner name.
        username: String,
        /// Resource owner password.
        password: String,
        /// Optional client id.
        client_id: Option<String>,
        /// Optional client secret.
        client_secret: Option<String>,
    },
}

impl fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OAuth2Credentials::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            OAuth2Credentials::Password {
                username, client_id, ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// A credential set with its optional grant type, scope and token URL overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Form {
    /// Grant-specific credentials.
    pub credentials: OAuth2Credentials,
    /// Explicit grant type; see [`OAuth2Form::grant_type`] for the default.
    pub grant_type: Option<String>,
    /// Requested scopes.
    pub scope: Option<Vec<String>>,
    /// Token path overriding the provider's default.
    pub token_url: Option<String>,
}

impl OAuth2Form {
    /// A `client_credentials` set.
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::from_credentials(OAuth2Credentials::ClientCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// A `password` set without client credentials.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::from_credentials(OAuth2Credentials::Password {
            username: username.into(),
            password: password.into(),
            client_id: None,
            client_secret: None,
        })
    }

    fn from_credentials(credentials: OAuth2Credentials) -> Self {
        Self {
            credentials,
            grant_type: None,
            scope: None,
            token_url: None,
        }
    }

    /// Adds client credentials to a `password` set. No effect on other sets.
    pub fn with_client(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        if let OAuth2Credentials::Password {
            client_id,
            client_secret,
            ..
        } = &mut self.credentials
        {
            *client_id = Some(id.into());
            *client_secret = Some(secret.into());
        }
        self
    }

    /// Overrides the grant type.
    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = Some(grant_type.into());
        self
    }

    /// Sets the requested scopes.
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Some(scope.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the token path.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    /// The grant type: the explicit one, else `password` when a user name is
    /// present, else `client_credentials`.
    pub fn grant_type(&self) -> &str {
        match (&self.grant_type, &self.credentials) {
            (Some(grant_type), _) => grant_type.as_str(),
            (None, OAuth2Credentials::Password { .. }) => "password",
            (None, OAuth2Credentials::ClientCredentials { .. }) => "client_credentials",
        }
    }

    fn client(&self) -> Option<(&str, Option<&str>)> {
        match &self.credentials {
            OAuth2Credentials::ClientCredentials {
                client_id,
                client_secret,
            } => Some((client_id.as_str(), Some(client_secret.as_str()))),
            OAuth2Credentials::Password {
                client_id: Some(client_id),
                client_secret,
                ..
            } => Some((client_id.as_str(), client_secret.as_deref())),
            OAuth2Credentials::Password { .. } => None,
        }
    }
}

/// A cached access token and the instant it stops being used.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// The access token.
    pub access_token: String,
    /// Server expiry minus [`EXPIRY_BUFFER_SECS`].
    pub expires_at: OffsetDateTime,
}

impl CachedToken {
    /// Whether the token is still usable at `instant`.
    pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
        instant < self.expires_at
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Lifecycle state of an [`OAuth2`] provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No credential set; the provider leaves requests unchanged.
    NoCredentials,
    /// Credentials present, nothing cached yet.
    Unissued,
    /// A cached token that is still usable.
    Valid,
    /// A cached token past its expiry.
    Expired,
}

/// The body of a token-endpoint request.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenRequestBody {
    /// A JSON object.
    Json(Value),
    /// URL-form fields.
    Form(Vec<(String, String)>),
}

/// A token-endpoint request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRequest {
    /// The resolved token URL.
    pub url: String,
    /// Transport-level basic credentials.
    pub basic_auth: Option<(String, Option<String>)>,
    /// The body.
    pub body: TokenRequestBody,
}

/// OAuth2 provider: obtains a token from the token endpoint, caches it until
/// shortly before expiry, and applies it through a static request mutator.
pub struct OAuth2 {
    base_url: String,
    default_token_url: String,
    access_token_pointer: String,
    expires_in_pointer: String,
    credentials_location: CredentialsLocation,
    body_content: BodyContent,
    request_mutator: Box<AuthProvider>,
    form: Option<OAuth2Form>,
    cache: Mutex<Option<CachedToken>>,
    http_client: reqwest::Client,
    blocking_client: OnceLock<reqwest::blocking::Client>,
}

impl OAuth2 {
    /// Starts building a provider for the given base URL and default token path.
    pub fn builder(
        base_url: impl Into<String>,
        default_token_url: impl Into<String>,
    ) -> OAuth2Builder {
        OAuth2Builder {
            base_url: base_url.into(),
            default_token_url: default_token_url.into(),
            access_token_pointer: "/access_token".to_string(),
            expires_in_pointer: "/expires_in".to_string(),
            credentials_location: CredentialsLocation::default(),
            body_content: BodyContent::default(),
            request_mutator: AuthProvider::Bearer(AuthBearer::default()),
            form: None,
            http_client: None,
        }
    }

    /// The credential set, if any.
    pub fn form(&self) -> Option<&OAuth2Form> {
        self.form.as_ref()
    }

    /// The token URL: an absolute override is used as-is, anything else is
    /// joined to the base URL.
    pub fn token_url(&self) -> String {
        let path = self
            .form
            .as_ref()
            .and_then(|form| form.token_url.as_deref())
            .unwrap_or(&self.default_token_url);
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            join_url(&self.base_url, path)
        }
    }

    /// A snapshot of the cached token.
    pub fn cached_token(&self) -> Option<CachedToken> {
        self.cache.lock().clone()
    }

    /// Replaces the cached token.
    pub fn store_token(&self, token: CachedToken) {
        *self.cache.lock() = Some(token);
    }

    /// Drops the cached token so the next request refreshes.
    pub fn clear_token(&self) {
        *self.cache.lock() = None;
    }

    /// The lifecycle state at `instant`.
    pub fn state_at(&self, instant: OffsetDateTime) -> TokenState {
        if self.form.is_none() {
            return TokenState::NoCredentials;
        }
        match self.cache.lock().as_ref() {
            None => TokenState::Unissued,
            Some(token) if token.is_valid_at(instant) => TokenState::Valid,
            Some(_) => TokenState::Expired,
        }
    }

    /// The lifecycle state now.
    pub fn state(&self) -> TokenState {
        self.state_at(OffsetDateTime::now_utc())
    }

    /// Builds the token-endpoint request, or `None` without credentials.
    pub fn token_request(&self) -> Option<TokenRequest> {
        let form = self.form.as_ref()?;
        let in_header = self.credentials_location == CredentialsLocation::BasicAuthorizationHeader;

        let mut fields = Map::new();
        fields.insert("grant_type".into(), Value::from(form.grant_type()));
        if let OAuth2Credentials::Password {
            username, password, ..
        } = &form.credentials
        {
            fields.insert("username".into(), Value::from(username.as_str()));
            fields.insert("password".into(), Value::from(password.as_str()));
        }

        let mut basic_auth = None;
        if let Some((client_id, client_secret)) = form.client() {
            if in_header {
                basic_auth = Some((client_id.to_string(), client_secret.map(str::to_string)));
            } else {
                fields.insert("client_id".into(), Value::from(client_id));
                if let Some(secret) = client_secret {
                    fields.insert("client_secret".into(), Value::from(secret));
                }
            }
        }

        let body = match self.body_content {
            BodyContent::Json => {
                if let Some(scope) = &form.scope {
                    fields.insert("scope".into(), Value::from(scope.clone()));
                }
                TokenRequestBody::Json(Value::Object(fields))
            }
            BodyContent::Form => {
                let mut pairs: Vec<(String, String)> = fields
                    .into_iter()
                    .filter_map(|(key, value)| value.as_str().map(|v| (key, v.to_string())))
                    .collect();
                if let Some(scope) = &form.scope {
                    pairs.push(("scope".into(), scope.join(" ")));
                }
                TokenRequestBody::Form(pairs)
            }
        };

        Some(TokenRequest {
            url: self.token_url(),
            basic_auth,
            body,
        })
    }

    fn require_token_request(&self) -> Result<TokenRequest> {
        self.token_request().ok_or_else(|| {
            Error::ConfigurationError("OAuth2 refresh requires a credential set".to_string())
        })
    }

    /// Calls the token endpoint and caches the result.
    ///
    /// # Errors
    ///
    /// Transport faults and non-success statuses are returned as-is, never retried.
    /// A response without an access token yields [`Error::InvalidTokenResponse`].
    pub async fn refresh(&self) -> Result<CachedToken> {
        let request = self.require_token_request()?;
        tracing::debug!(
            token_url = %request.url,
            grant_type = self.form.as_ref().map(OAuth2Form::grant_type),
            "Refreshing OAuth2 access token"
        );

        let mut builder = self.http_client.post(&request.url);
        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, password.as_ref());
        }
        builder = match &request.body {
            TokenRequestBody::Json(value) => builder.json(value),
            TokenRequestBody::Form(pairs) => builder.form(pairs),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.text().await?;
        self.accept_response(status, headers, raw)
    }

    /// Blocking variant of [`OAuth2::refresh`].
    ///
    /// Must not be called from within an async runtime.
    pub fn refresh_blocking(&self) -> Result<CachedToken> {
        let request = self.require_token_request()?;
        tracing::debug!(
            token_url = %request.url,
            grant_type = self.form.as_ref().map(OAuth2Form::grant_type),
            "Refreshing OAuth2 access token"
        );

        let client = self.blocking_client()?;
        let mut builder = client.post(&request.url);
        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, password.as_ref());
        }
        builder = match &request.body {
            TokenRequestBody::Json(value) => builder.json(value),
            TokenRequestBody::Form(pairs) => builder.form(pairs),
        };

        let response = builder.send()?;
        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.text()?;
        self.accept_response(status, headers, raw)
    }

    fn blocking_client(&self) -> Result<reqwest::blocking::Client> {
        if let Some(client) = self.blocking_client.get() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Error::ConfigurationError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self.blocking_client.get_or_init(|| client).clone())
    }

    fn accept_response(
        &self,
        status: StatusCode,
        headers: HeaderMap,
        raw: String,
    ) -> Result<CachedToken> {
        if !status.is_success() {
            tracing::error!(status = %status, "OAuth2 token request failed");
            return Err(Error::api(status, headers, raw));
        }
        let body: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidTokenResponse(format!("body is not JSON: {}", e)))?;
        let token = parse_token_response(
            &body,
            &self.access_token_pointer,
            &self.expires_in_pointer,
            OffsetDateTime::now_utc(),
        )?;
        tracing::debug!(expires_at = %token.expires_at, "Cached OAuth2 access token");
        self.store_token(token.clone());
        Ok(token)
    }

    fn usable_token(&self) -> Option<CachedToken> {
        let now = OffsetDateTime::now_utc();
        self.cache
            .lock()
            .as_ref()
            .filter(|token| token.is_valid_at(now))
            .cloned()
    }

    fn apply_token(
        &self,
        token: &CachedToken,
        descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        let mut mutator = (*self.request_mutator).clone();
        mutator.set_value(Some(token.access_token.clone()))?;
        mutator.apply_static(descriptor)
    }

    /// Applies a usable token, refreshing it with the blocking transport first if needed.
    pub fn add_to_request(&self, descriptor: RequestDescriptor) -> Result<RequestDescriptor> {
        if self.form.is_none() {
            return Ok(descriptor);
        }
        let token = match self.usable_token() {
            Some(token) => token,
            None => self.refresh_blocking()?,
        };
        self.apply_token(&token, descriptor)
    }

    /// Applies a usable token, refreshing it asynchronously first if needed.
    pub async fn add_to_request_async(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        if self.form.is_none() {
            return Ok(descriptor);
        }
        let token = match self.usable_token() {
            Some(token) => token,
            None => self.refresh().await?,
        };
        self.apply_token(&token, descriptor)
    }
}

impl fmt::Debug for OAuth2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2")
            .field("token_url", &self.token_url())
            .field("credentials_location", &self.credentials_location)
            .field("body_content", &self.body_content)
            .field("form", &self.form)
            .field("state", &self.state())
            .finish()
    }
}

/// Extracts a token from a token-endpoint response body.
///
/// A missing or non-integer expiry counts as [`DEFAULT_EXPIRES_IN_SECS`].
pub fn parse_token_response(
    body: &Value,
    access_token_pointer: &str,
    expires_in_pointer: &str,
    now: OffsetDateTime,
) -> Result<CachedToken> {
    let access_token = body
        .pointer(access_token_pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::InvalidTokenResponse(format!("no access token at '{}'", access_token_pointer))
        })?;
    let expires_in = body
        .pointer(expires_in_pointer)
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Ok(CachedToken {
        access_token: access_token.to_string(),
        expires_at: expiry_after(now, expires_in),
    })
}

/// `now + expires_in - EXPIRY_BUFFER_SECS`, clamped to the representable range.
fn expiry_after(now: OffsetDateTime, expires_in: i64) -> OffsetDateTime {
    let lifetime = time::Duration::seconds(expires_in.saturating_sub(EXPIRY_BUFFER_SECS));
    now.checked_add(lifetime).unwrap_or_else(|| {
        let bound = if lifetime.is_negative() {
            time::Date::MIN
        } else {
            time::Date::MAX
        };
        bound.midnight().assume_utc()
    })
}

/// Builder for [`OAuth2`].
#[derive(Debug)]
pub struct OAuth2Builder {
    base_url: String,
    default_token_url: String,
    access_token_pointer: String,
    expires_in_pointer: String,
    credentials_location: CredentialsLocation,
    body_content: BodyContent,
    request_mutator: AuthProvider,
    form: Option<OAuth2Form>,
    http_client: Option<reqwest::Client>,
}

impl OAuth2Builder {
    /// JSON pointer to the access token in the response (default `/access_token`).
    pub fn access_token_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.access_token_pointer = pointer.into();
        self
    }

    /// JSON pointer to the lifetime in seconds (default `/expires_in`).
    pub fn expires_in_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.expires_in_pointer = pointer.into();
        self
    }

    /// Where client credentials go.
    pub fn credentials_location(mut self, location: CredentialsLocation) -> Self {
        self.credentials_location = location;
        self
    }

    /// How the token request body is encoded.
    pub fn body_content(mut self, content: BodyContent) -> Self {
        self.body_content = content;
        self
    }

    /// The static provider that places the token (default: bearer).
    pub fn request_mutator(mut self, mutator: impl Into<AuthProvider>) -> Self {
        self.request_mutator = mutator.into();
        self
    }

    /// The credential set. Without one the provider is a no-op.
    pub fn form(mut self, form: OAuth2Form) -> Self {
        self.form = Some(form);
        self
    }

    /// The async transport used for refreshes.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] if the mutator is itself OAuth2,
    /// or a configuration error if the transport cannot be built.
    pub fn build(self) -> Result<OAuth2> {
        if matches!(self.request_mutator, AuthProvider::OAuth2(_)) {
            return Err(Error::UnsupportedOperation(
                "an OAuth2 auth provider cannot be a request_mutator".to_string(),
            ));
        }
        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?,
        };

        Ok(OAuth2 {
            base_url: self.base_url,
            default_token_url: self.default_token_url,
            access_token_pointer: self.access_token_pointer,
            expires_in_pointer: self.expires_in_pointer,
            credentials_location: self.credentials_location,
            body_content: self.body_content,
            request_mutator: Box::new(self.request_mutator),
            form: self.form,
            cache: Mutex::new(None),
            http_client,
            blocking_client: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthKey, KeyLocation};
    use http::Method;
    use serde_json::json;

    fn provider(
        form: Option<OAuth2Form>,
        location: CredentialsLocation,
        content: BodyContent,
    ) -> OAuth2 {
        let mut builder = OAuth2::builder("https://api.example.com", "/oauth/token")
            .credentials_location(location)
            .body_content(content)
            .request_mutator(AuthKey::new("Mock-Auth", KeyLocation::Header));
        if let Some(form) = form {
            builder = builder.form(form);
        }
        builder.build().unwrap()
    }

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::new(Method::GET, "https://example.com")
    }

    #[test]
    fn test_grant_type_defaults() {
        assert_eq!(OAuth2Form::password("user", "pass").grant_type(), "password");
        assert_eq!(
            OAuth2Form::client_credentials("client", "secret").grant_type(),
            "client_credentials"
        );
        assert_eq!(
            OAuth2Form::client_credentials("client", "secret")
                .with_grant_type("urn:custom")
                .grant_type(),
            "urn:custom"
        );
    }

    #[test]
    fn test_json_body_in_request_body() {
        let oauth = provider(
            Some(
                OAuth2Form::client_credentials("test-client", "test-secret")
                    .with_scope(["read", "write"]),
            ),
            CredentialsLocation::RequestBody,
            BodyContent::Json,
        );

        let request = oauth.token_request().unwrap();

        assert_eq!(request.url, "https://api.example.com/oauth/token");
        assert_eq!(request.basic_auth, None);
        assert_eq!(
            request.body,
            TokenRequestBody::Json(json!({
                "grant_type": "client_credentials",
                "client_id": "test-client",
                "client_secret": "test-secret",
                "scope": ["read", "write"],
            }))
        );
    }

    #[test]
    fn test_form_body_with_basic_header() {
        let oauth = provider(
            Some(
                OAuth2Form::client_credentials("basic-client", "basic-secret")
                    .with_scope(["read", "write", "admin"]),
            ),
            CredentialsLocation::BasicAuthorizationHeader,
            BodyContent::Form,
        );

        let request = oauth.token_request().unwrap();

        assert_eq!(
            request.basic_auth,
            Some(("basic-client".to_string(), Some("basic-secret".to_string())))
        );
        let TokenRequestBody::Form(pairs) = request.body else {
            panic!("expected form body");
        };
        assert!(pairs.iter().all(|(key, _)| key != "client_id" && key != "client_secret"));
        assert!(pairs.contains(&("scope".to_string(), "read write admin".to_string())));
        assert!(pairs.contains(&("grant_type".to_string(), "client_credentials".to_string())));
    }

    #[test]
    fn test_password_fields() {
        let oauth = provider(
            Some(OAuth2Form::password("testuser", "testpass").with_client("client", "secret")),
            CredentialsLocation::RequestBody,
            BodyContent::Form,
        );

        let TokenRequestBody::Form(pairs) = oauth.token_request().unwrap().body else {
            panic!("expected form body");
        };
        for expected in [
            ("grant_type", "password"),
            ("username", "testuser"),
            ("password", "testpass"),
            ("client_id", "client"),
            ("client_secret", "secret"),
        ] {
            assert!(pairs.contains(&(expected.0.to_string(), expected.1.to_string())));
        }
    }

    #[test]
    fn test_token_url_join() {
        let oauth = OAuth2::builder("https://api.example.com/", "/oauth/token")
            .build()
            .unwrap();
        assert_eq!(oauth.token_url(), "https://api.example.com/oauth/token");

        let custom = OAuth2::builder("https://api.example.com", "/oauth/token")
            .form(OAuth2Form::password("u", "p").with_token_url("/custom/token"))
            .build()
            .unwrap();
        assert_eq!(custom.token_url(), "https://api.example.com/custom/token");

        let absolute = OAuth2::builder("https://api.example.com", "/oauth/token")
            .form(OAuth2Form::password("u", "p").with_token_url("https://auth.example.com/token"))
            .build()
            .unwrap();
        assert_eq!(absolute.token_url(), "https://auth.example.com/token");
    }

    #[test]
    fn test_parse_token_response_expiry() {
        let now = OffsetDateTime::now_utc();

        let token = parse_token_response(
            &json!({"access_token": "t", "expires_in": 3600}),
            "/access_token",
            "/expires_in",
            now,
        )
        .unwrap();
        assert_eq!(token.expires_at, now + time::Duration::seconds(3540));

        for body in [
            json!({"access_token": "t", "expires_in": "not-an-integer"}),
            json!({"access_token": "t"}),
        ] {
            let token = parse_token_response(&body, "/access_token", "/expires_in", now).unwrap();
            assert_eq!(token.expires_at, now + time::Duration::seconds(540));
        }
    }

    #[test]
    fn test_parse_token_response_extreme_expiry() {
        let now = OffsetDateTime::now_utc();

        let forever = parse_token_response(
            &json!({"access_token": "t", "expires_in": i64::MAX}),
            "/access_token",
            "/expires_in",
            now,
        )
        .unwrap();
        assert!(forever.is_valid_at(now + time::Duration::days(365 * 100)));

        let never = parse_token_response(
            &json!({"access_token": "t", "expires_in": i64::MIN}),
            "/access_token",
            "/expires_in",
            now,
        )
        .unwrap();
        assert!(!never.is_valid_at(now));
    }

    #[test]
    fn test_parse_token_response_nested_pointer() {
        let token = parse_token_response(
            &json!({"data": {"token": "nested"}}),
            "/data/token",
            "/data/ttl",
            OffsetDateTime::now_utc(),
        )
        .unwrap();
        assert_eq!(token.access_token, "nested");

        let now = OffsetDateTime::now_utc();
        let err = parse_token_response(&json!({}), "/access_token", "/expires_in", now)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTokenResponse(_)));
    }

    #[test]
    fn test_no_credentials_is_noop() {
        let oauth = provider(None, CredentialsLocation::RequestBody, BodyContent::Form);

        assert_eq!(oauth.state(), TokenState::NoCredentials);
        assert!(oauth.token_request().is_none());
        let result = oauth.add_to_request(descriptor()).unwrap();
        assert!(result.headers.is_empty());
    }

    #[test]
    fn test_valid_token_is_reused() {
        let oauth = provider(
            Some(OAuth2Form::client_credentials("client", "secret")),
            CredentialsLocation::RequestBody,
            BodyContent::Form,
        );
        assert_eq!(oauth.state(), TokenState::Unissued);

        oauth.store_token(CachedToken {
            access_token: "existing-token".into(),
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        });
        assert_eq!(oauth.state(), TokenState::Valid);

        // The base URL is unroutable in tests, so a refresh would fail here.
        let result = oauth.add_to_request(descriptor()).unwrap();
        assert_eq!(result.header("Mock-Auth"), Some("existing-token"));
    }

    #[test]
    fn test_expired_state() {
        let oauth = provider(
            Some(OAuth2Form::client_credentials("client", "secret")),
            CredentialsLocation::RequestBody,
            BodyContent::Form,
        );
        oauth.store_token(CachedToken {
            access_token: "expired-token".into(),
            expires_at: OffsetDateTime::now_utc() - time::Duration::hours(1),
        });
        assert_eq!(oauth.state(), TokenState::Expired);

        oauth.clear_token();
        assert_eq!(oauth.state(), TokenState::Unissued);
    }

    #[test]
    fn test_oauth2_cannot_be_mutator() {
        let inner = OAuth2::builder("https://api.example.com", "/token").build().unwrap();
        let err = OAuth2::builder("https://api.example.com", "/token")
            .request_mutator(inner)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));

        let mut provider = AuthProvider::from(
            OAuth2::builder("https://api.example.com", "/token").build().unwrap(),
        );
        let err = provider.set_value(Some("some-value".into())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported operation: an OAuth2 auth provider cannot be a request_mutator"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = CachedToken {
            access_token: "super-secret".into(),
            expires_at: OffsetDateTime::now_utc(),
        };
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
