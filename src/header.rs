//! Guarded response headers.
//!
//! Every interceptor on a pipeline writes into the same per-request
//! [`Header`]. To stop two of them from silently overwriting each other's
//! security headers, a component can [`claim`](Header::claim) a header name.
//! The claim is exclusive for the rest of the request: plain `set`/`add`/`del`
//! calls on a claimed name fail, and the value can only be changed by
//! presenting the [`HeaderClaim`] returned to the owner.
//!
//! ```text
//! csp.before()        header.claim("content-security-policy")  → Ok(claim)
//! handler             header.set("content-security-policy", ..) → Err(HeaderClaimed)
//! csp.commit()        header.set_claimed(&claim, policy)        → Ok(())
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::Error;

// Claim owners are unique across every request in the process, so a claim
// kept past its request never matches a later one.
static NEXT_OWNER: AtomicU64 = AtomicU64::new(0);

/// Proof of exclusive ownership of one header name for one request.
///
/// Not `Clone`: the owner keeps it (typically in the request's
/// [extensions](crate::Request::extensions_mut)) and presents it to
/// [`Header::set_claimed`].
#[derive(Debug)]
pub struct HeaderClaim {
    name: HeaderName,
    owner: u64,
}

impl HeaderClaim {
    pub fn name(&self) -> &HeaderName {
        &self.name
    }
}

/// The header collection of a response, with per-name ownership.
#[derive(Debug, Default)]
pub struct Header {
    map: HeaderMap,
    claims: HashMap<HeaderName, u64>,
}

impl Header {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Grants exclusive ownership of `name` to the caller.
    ///
    /// Succeeds exactly once per name per request; every later claim of the
    /// same name fails with [`Error::HeaderClaimed`].
    pub fn claim(&mut self, name: impl AsRef<str>) -> Result<HeaderClaim, Error> {
        let name = self.writable_name(name.as_ref())?;
        let owner = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        self.claims.insert(name.clone(), owner);
        Ok(HeaderClaim { name, owner })
    }

    /// Replaces every value of an unclaimed header.
    pub fn set(&mut self, name: impl AsRef<str>, value: &str) -> Result<(), Error> {
        let name = self.writable_name(name.as_ref())?;
        self.map.insert(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Appends a value to an unclaimed header.
    pub fn add(&mut self, name: impl AsRef<str>, value: &str) -> Result<(), Error> {
        let name = self.writable_name(name.as_ref())?;
        self.map.append(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Removes an unclaimed header.
    pub fn del(&mut self, name: impl AsRef<str>) -> Result<(), Error> {
        let name = self.writable_name(name.as_ref())?;
        self.map.remove(name);
        Ok(())
    }

    /// Replaces every value of a header the caller owns.
    pub fn set_claimed(&mut self, claim: &HeaderClaim, value: &str) -> Result<(), Error> {
        let value = self.owned_value(claim, value)?;
        self.map.insert(claim.name.clone(), value);
        Ok(())
    }

    /// Appends a value to a header the caller owns.
    pub fn append_claimed(&mut self, claim: &HeaderClaim, value: &str) -> Result<(), Error> {
        let value = self.owned_value(claim, value)?;
        self.map.append(claim.name.clone(), value);
        Ok(())
    }

    /// First value of `name`, if present and valid UTF-8.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.map.get(name.as_ref()).and_then(|v| v.to_str().ok())
    }

    /// All values of `name` that are valid UTF-8, in insertion order.
    pub fn get_all(&self, name: impl AsRef<str>) -> Vec<&str> {
        self.map
            .get_all(name.as_ref())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.map.contains_key(name.as_ref())
    }

    pub fn is_claimed(&self, name: impl AsRef<str>) -> bool {
        HeaderName::from_bytes(name.as_ref().as_bytes())
            .map(|name| self.claims.contains_key(&name))
            .unwrap_or(false)
    }

    /// Read-only view of the underlying map.
    pub fn as_map(&self) -> &HeaderMap {
        &self.map
    }

    // ── Writer-internal access ────────────────────────────────────────────────
    //
    // Framing headers (content-type, location, set-cookie) belong to the
    // writer, not to any interceptor, so these bypass the claim table.

    pub(crate) fn insert_framing(&mut self, name: HeaderName, value: HeaderValue) {
        self.map.insert(name, value);
    }

    pub(crate) fn append_framing(&mut self, name: HeaderName, value: HeaderValue) {
        self.map.append(name, value);
    }

    pub(crate) fn remove_framing(&mut self, name: &HeaderName) {
        self.map.remove(name);
    }

    pub(crate) fn into_map(self) -> HeaderMap {
        self.map
    }

    fn writable_name(&self, name: &str) -> Result<HeaderName, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        if name == SET_COOKIE {
            return Err(Error::ImmutableHeader(name));
        }
        if self.claims.contains_key(&name) {
            return Err(Error::HeaderClaimed(name));
        }
        Ok(name)
    }

    fn owned_value(&self, claim: &HeaderClaim, value: &str) -> Result<HeaderValue, Error> {
        if self.claims.get(&claim.name) != Some(&claim.owner) {
            return Err(Error::HeaderClaimed(claim.name.clone()));
        }
        Ok(HeaderValue::from_str(value)?)
    }
}
