//! Credentials and authorization header schemes.
//!
//! The IDM accepts either HTTP Basic authentication or its own pair of
//! `X-OpenIDM-Username` / `X-OpenIDM-Password` headers. Both schemes are
//! supported so the same probes work against either deployment style.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Header carrying the username for [`AuthScheme::OpenIdmHeaders`].
pub const OPENIDM_USERNAME_HEADER: &str = "X-OpenIDM-Username";

/// Header carrying the password for [`AuthScheme::OpenIdmHeaders`].
pub const OPENIDM_PASSWORD_HEADER: &str = "X-OpenIDM-Password";

/// Username and password pair.
///
/// The password is a [`SecretString`], so `Debug` output never contains it.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// The IDM's built-in anonymous user.
    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous")
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `Basic <base64(username:password)>`.
    pub fn basic_header_value(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password.expose_secret());
        format!("Basic {}", STANDARD.encode(pair))
    }
}

/// How credentials are presented to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// `Authorization: Basic ...`
    #[default]
    Basic,
    /// `X-OpenIDM-Username` and `X-OpenIDM-Password` headers.
    OpenIdmHeaders,
}

impl AuthScheme {
    /// Headers that authenticate `credentials` under this scheme.
    pub fn headers(&self, credentials: &Credentials) -> Vec<(String, String)> {
        match self {
            AuthScheme::Basic => vec![(
                "Authorization".to_string(),
                credentials.basic_header_value(),
            )],
            AuthScheme::OpenIdmHeaders => vec![
                (
                    OPENIDM_USERNAME_HEADER.to_string(),
                    credentials.username.clone(),
                ),
                (
                    OPENIDM_PASSWORD_HEADER.to_string(),
                    credentials.password.expose_secret().to_string(),
                ),
            ],
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown auth scheme '{0}' (expected 'basic' or 'headers')")]
pub struct UnknownAuthScheme(pub String);

impl FromStr for AuthScheme {
    type Err = UnknownAuthScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthScheme::Basic),
            "headers" | "openidm-headers" => Ok(AuthScheme::OpenIdmHeaders),
            other => Err(UnknownAuthScheme(other.to_string())),
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Basic => write!(f, "basic"),
            AuthScheme::OpenIdmHeaders => write!(f, "headers"),
        }
    }
}

/// Whether a header carries credential material and must be redacted.
pub fn is_sensitive_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case(OPENIDM_PASSWORD_HEADER)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_basic_header() {
        // base64("anonymous:anonymous")
        assert_eq!(
            Credentials::anonymous().basic_header_value(),
            "Basic YW5vbnltb3VzOmFub255bW91cw=="
        );
    }

    #[test]
    fn test_basic_scheme_emits_single_authorization_header() {
        let headers = AuthScheme::Basic.headers(&Credentials::new("openidm-admin", "openidm-admin"));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "Authorization");
        assert!(headers[0].1.starts_with("Basic "));
    }

    #[test]
    fn test_openidm_headers_scheme() {
        let headers = AuthScheme::OpenIdmHeaders.headers(&Credentials::new("admin", "s3cret"));
        assert_eq!(
            headers,
            vec![
                ("X-OpenIDM-Username".to_string(), "admin".to_string()),
                ("X-OpenIDM-Password".to_string(), "s3cret".to_string()),
            ]
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug_output = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(debug_output.contains("admin"));
        assert!(!debug_output.contains("hunter2"), "password must be redacted");
    }

    #[test]
    fn test_auth_scheme_from_str() {
        assert_eq!("basic".parse::<AuthScheme>().unwrap(), AuthScheme::Basic);
        assert_eq!(
            " Headers ".parse::<AuthScheme>().unwrap(),
            AuthScheme::OpenIdmHeaders
        );
        assert!("digest".parse::<AuthScheme>().is_err());
    }

    #[test]
    fn test_sensitive_headers() {
        assert!(is_sensitive_header("authorization"));
        assert!(is_sensitive_header("X-OpenIDM-Password"));
        assert!(!is_sensitive_header("X-OpenIDM-Username"));
        assert!(!is_sensitive_header("Content-Type"));
    }
}
