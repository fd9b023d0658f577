//! Who is signed in and how requests authenticate. Login and session
//! persistence live with the host; the gateway only asks for credentials.

use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// API key pair, sent as `Authorization: token <key>:<secret>`.
    Token { api_key: String, api_secret: String },
    /// Cookie session held by the HTTP client.
    Session,
    Anonymous,
}

impl Credentials {
    pub fn token(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Credentials::Token {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Value for the `Authorization` header, if these credentials use one.
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Credentials::Token {
                api_key,
                api_secret,
            } => Some(format!("token {api_key}:{api_secret}")),
            Credentials::Session | Credentials::Anonymous => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token { api_key, .. } => f
                .debug_struct("Token")
                .field("api_key", api_key)
                .field("api_secret", &"<redacted>")
                .finish(),
            Credentials::Session => f.write_str("Session"),
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

pub trait AuthProvider: Send + Sync {
    /// Login name of the signed-in user, if known.
    fn current_user(&self) -> Option<String>;
    fn credentials(&self) -> Credentials;
}

/// Fixed identity, e.g. from environment variables.
#[derive(Debug, Clone)]
pub struct StaticAuth {
    user: Option<String>,
    credentials: Credentials,
}

impl StaticAuth {
    pub fn new(user: Option<String>, credentials: Credentials) -> Self {
        Self { user, credentials }
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<String> {
        self.user.clone()
    }

    fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }
}
