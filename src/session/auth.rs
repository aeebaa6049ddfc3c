//! Authentication handoff
//!
//! The cookie/session layer is external to this crate. It is reached through
//! the [`Authenticator`] trait, consulted exactly once per connection while it
//! is still `Connecting`.

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AuthError;

/// Category of identity attached to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthClass {
    /// A registered driver
    Driver,
    /// A series administrator (announcer, data entry)
    Series,
}

impl AuthClass {
    /// Both classes, in a fixed order
    pub const ALL: [AuthClass; 2] = [AuthClass::Driver, AuthClass::Series];

    /// Parse the `authtype` names used by the web session layer
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "driver" => Some(AuthClass::Driver),
            "series" => Some(AuthClass::Series),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthClass::Driver => "driver",
            AuthClass::Series => "series",
        }
    }
}

impl std::fmt::Display for AuthClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved identity of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Driver, by driver id
    Driver(Uuid),
    /// Administrator logged into the named series
    SeriesAdmin(String),
}

impl Identity {
    /// Authorization class implied by this identity
    pub fn class(&self) -> AuthClass {
        match self {
            Identity::Driver(_) => AuthClass::Driver,
            Identity::SeriesAdmin(_) => AuthClass::Series,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Driver(id) => write!(f, "driver:{}", id),
            Identity::SeriesAdmin(series) => write!(f, "series:{}", series),
        }
    }
}

/// Outcome of a successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub identity: Identity,
    /// Series the connection is scoped to once live
    pub series: String,
}

impl Grant {
    pub fn driver(driver_id: Uuid, series: impl Into<String>) -> Self {
        Self {
            identity: Identity::Driver(driver_id),
            series: series.into(),
        }
    }

    pub fn series_admin(series: impl Into<String>) -> Self {
        let series = series.into();
        Self {
            identity: Identity::SeriesAdmin(series.clone()),
            series,
        }
    }

    pub fn class(&self) -> AuthClass {
        self.identity.class()
    }
}

/// What the transport knows about a connection at handshake time
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Request path, e.g. `/auto21`
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// Raw `Cookie` header
    pub cookie: Option<String>,
    pub peer_addr: Option<SocketAddr>,
}

impl AuthRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// First non-empty path segment, taken as the requested series
    pub fn series_hint(&self) -> Option<&str> {
        self.path.split('/').find(|s| !s.is_empty())
    }

    /// Value of a `key=value` pair in the query string
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.as_deref().and_then(|q| {
            q.split('&').find_map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (k == name).then_some(v)
            })
        })
    }

    /// Value of a cookie from the `Cookie` header
    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        self.cookie.as_deref().and_then(|c| {
            c.split(';').find_map(|pair| {
                let (k, v) = pair.trim().split_once('=')?;
                (k == name).then_some(v)
            })
        })
    }
}

/// Resolves a handshake into an identity
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Grant, AuthError>;
}

/// In-memory token table
///
/// The token is read from the `token` query parameter, falling back to the
/// `session` cookie. Drivers may watch whichever series the path names;
/// series administrators are held to their own series.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, Grant>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token
    pub fn grant(mut self, token: impl Into<String>, grant: Grant) -> Self {
        self.tokens.insert(token.into(), grant);
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Grant, AuthError> {
        let token = request
            .query_param("token")
            .or_else(|| request.cookie_value("session"))
            .ok_or(AuthError::MissingCredentials)?;

        let mut grant = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        if let Some(series) = request.series_hint() {
            match grant.class() {
                AuthClass::Driver => grant.series = series.to_string(),
                AuthClass::Series if series != grant.series => {
                    return Err(AuthError::SeriesDenied(series.to_string()));
                }
                AuthClass::Series => {}
            }
        }

        Ok(grant)
    }
}
