//! Outgoing cookies with secure defaults.

use std::fmt;
use std::time::Duration;

use crate::error::Error;

/// The `SameSite` cookie attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax    => "Lax",
            Self::None   => "None",
        }
    }
}

/// A `Set-Cookie` entry.
///
/// Starts out `Secure`, `HttpOnly`, `SameSite=Lax` and scoped to `/`. Each
/// relaxation is an explicit builder call.
///
/// ```rust
/// use warden::{Cookie, SameSite};
///
/// let session = Cookie::new("session", "opaque-id")
///     .same_site(SameSite::Strict)
///     .max_age(std::time::Duration::from_secs(3600));
/// assert_eq!(session.name(), "session");
/// ```
#[derive(Clone, Debug)]
pub struct Cookie {
    name: String,
    value: String,
    path: String,
    domain: Option<String>,
    max_age: Option<Duration>,
    same_site: SameSite,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_owned(),
            domain: None,
            max_age: None,
            same_site: SameSite::Lax,
            secure: true,
            http_only: true,
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn value(&self) -> &str { &self.value }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Allows the cookie over plain HTTP. Only for local development.
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    /// Exposes the cookie to scripts.
    pub fn script_visible(mut self) -> Self {
        self.http_only = false;
        self
    }

    /// Checks the name is an RFC 6265 token and the value uses cookie-octets.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() || !self.name.bytes().all(is_token_byte) {
            return Err(Error::InvalidCookie(format!("bad name `{}`", self.name)));
        }
        let value = self.value.strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(&self.value);
        if !value.bytes().all(is_cookie_octet) {
            return Err(Error::InvalidCookie(format!("bad value for `{}`", self.name)));
        }
        let attrs = [Some(self.path.as_str()), self.domain.as_deref()];
        if attrs.into_iter().flatten().any(|a| a.bytes().any(|b| b == b';' || b.is_ascii_control())) {
            return Err(Error::InvalidCookie(format!("bad attribute for `{}`", self.name)));
        }
        Ok(())
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(age) = self.max_age {
            write!(f, "; Max-Age={}", age.as_secs())?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2b | 0x2d..=0x3a | 0x3c..=0x5b | 0x5d..=0x7e)
}
