//! HTTP Cookies

use std::borrow::Cow;
use std::convert::TryInto;
use std::fmt;
use std::sync::RwLock;
use std::time::SystemTime;

use bytes::BufMut;

use crate::header::HeaderValue;

/// Actions for a persistent cookie store providing session support.
pub trait CookieStore: Send + Sync {
    /// Store a set of Set-Cookie header values received from `url`
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &url::Url);

    /// Get any Cookie values in the store for `url`
    fn cookies(&self, url: &url::Url) -> Option<HeaderValue>;
}

/// A single HTTP cookie.
#[derive(Debug, Clone)]
pub struct Cookie<'a>(cookie_crate::Cookie<'a>);

/// A good default `CookieStore` implementation.
///
/// This is the implementation used when the cookie-jar option is simply set
/// to `true`. No public-suffix policy is applied. This type is exposed to
/// allow creating one and filling it with some existing cookies more
/// easily, before handing it to a client.
#[derive(Debug, Default)]
pub struct Jar(RwLock<cookie_store::CookieStore>);

// ===== impl Cookie =====

impl<'a> Cookie<'a> {
    pub(crate) fn parse(value: &'a HeaderValue) -> Result<Cookie<'a>, CookieParseError> {
        std::str::from_utf8(value.as_bytes())
            .map_err(cookie_crate::ParseError::from)
            .and_then(cookie_crate::Cookie::parse)
            .map_err(CookieParseError)
            .map(Cookie)
    }

    /// Creates a new `Cookie` instance from the given name and value.
    pub fn new<N, V>(name: N, value: V) -> Cookie<'a>
    where
        N: Into<Cow<'a, str>>,
        V: Into<Cow<'a, str>>,
    {
        Cookie(cookie_crate::Cookie::new(name, value))
    }

    /// The name of the cookie.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// The value of the cookie.
    pub fn value(&self) -> &str {
        self.0.value()
    }

    /// Returns true if the 'HttpOnly' directive is enabled.
    pub fn http_only(&self) -> bool {
        self.0.http_only().unwrap_or(false)
    }

    /// Returns true if the 'Secure' directive is enabled.
    pub fn secure(&self) -> bool {
        self.0.secure().unwrap_or(false)
    }

    /// Returns the path directive of the cookie, if set.
    pub fn path(&self) -> Option<&str> {
        self.0.path()
    }

    /// Returns the domain directive of the cookie, if set.
    pub fn domain(&self) -> Option<&str> {
        self.0.domain()
    }

    /// Get the Max-Age information.
    pub fn max_age(&self) -> Option<std::time::Duration> {
        self.0.max_age().and_then(|d| d.try_into().ok())
    }

    /// The cookie expiration time.
    pub fn expires(&self) -> Option<SystemTime> {
        match self.0.expires() {
            Some(cookie_crate::Expiration::DateTime(offset)) => Some(SystemTime::from(offset)),
            None | Some(cookie_crate::Expiration::Session) => None,
        }
    }

    /// Converts `self` into a `Cookie` with a static lifetime with as few
    /// allocations as possible.
    pub fn into_owned(self) -> Cookie<'static> {
        Cookie(self.0.into_owned())
    }

    pub(crate) fn as_raw(&self) -> &cookie_crate::Cookie<'a> {
        &self.0
    }
}

impl fmt::Display for Cookie<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) fn extract_response_cookie_headers(
    headers: &http::HeaderMap,
) -> impl Iterator<Item = &'_ HeaderValue> {
    headers.get_all(crate::header::SET_COOKIE).iter()
}

pub(crate) fn extract_response_cookies(
    headers: &http::HeaderMap,
) -> impl Iterator<Item = Result<Cookie<'_>, CookieParseError>> {
    headers
        .get_all(crate::header::SET_COOKIE)
        .iter()
        .map(Cookie::parse)
}

/// Error representing a parse failure of a 'Set-Cookie' header.
pub(crate) struct CookieParseError(cookie_crate::ParseError);

impl fmt::Debug for CookieParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for CookieParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for CookieParseError {}

// ===== impl Jar =====

impl Jar {
    /// Add a cookie str to this jar.
    ///
    /// # Example
    ///
    /// ```
    /// use httpclient::cookie::Jar;
    /// use httpclient::Url;
    ///
    /// let cookie = "foo=bar; Domain=yolo.local";
    /// let url = "https://yolo.local".parse::<Url>().unwrap();
    ///
    /// let jar = Jar::default();
    /// jar.add_cookie_str(cookie, &url);
    /// ```
    pub fn add_cookie_str(&self, cookie: &str, url: &url::Url) {
        let cookies = cookie_crate::Cookie::parse(cookie)
            .ok()
            .map(|c| c.into_owned())
            .into_iter();
        self.0.write().unwrap().store_response_cookies(cookies, url);
    }

    /// Add a cookie to this jar.
    pub fn add_cookie(&self, cookie: Cookie<'_>, url: &url::Url) {
        let _ = self
            .0
            .write()
            .unwrap()
            .insert_raw(cookie.as_raw(), url);
    }

    /// Removes a `Cookie` from the jar.
    pub fn remove(&self, name: &str, url: &url::Url) {
        if let Some(domain) = url.host_str() {
            self.0.write().unwrap().remove(domain, url.path(), name);
        }
    }

    /// Clear the contents of the jar.
    pub fn clear(&self) {
        self.0.write().unwrap().clear();
    }
}

impl CookieStore for Jar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &url::Url) {
        let iter =
            cookie_headers.filter_map(|val| Cookie::parse(val).map(|c| c.0.into_owned()).ok());

        self.0.write().unwrap().store_response_cookies(iter, url);
    }

    fn cookies(&self, url: &url::Url) -> Option<HeaderValue> {
        let mut out = bytes::BytesMut::with_capacity(64);
        let lock = self.0.read().unwrap();
        for (name, value) in lock.get_request_values(url) {
            if !out.is_empty() {
                out.put(&b"; "[..]);
            }
            out.put(name.as_bytes());
            out.put(&b"="[..]);
            out.put(value.as_bytes());
        }

        if out.is_empty() {
            None
        } else {
            HeaderValue::from_maybe_shared(out.freeze()).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn jar_round_trip() {
        let jar = Jar::default();
        let url = Url::parse("http://example.local/").unwrap();

        jar.add_cookie_str("foo=bar", &url);
        jar.add_cookie(Cookie::new("baz", "qux"), &url);

        let header = CookieStore::cookies(&jar, &url).unwrap();
        let value = header.to_str().unwrap();
        assert!(value.contains("foo=bar"));
        assert!(value.contains("baz=qux"));

        jar.remove("foo", &url);
        let header = CookieStore::cookies(&jar, &url).unwrap();
        assert!(!header.to_str().unwrap().contains("foo=bar"));

        jar.clear();
        assert!(CookieStore::cookies(&jar, &url).is_none());
    }

    #[test]
    fn set_cookies_stores_response_cookies() {
        let jar = Jar::default();
        let url = Url::parse("http://example.local/").unwrap();

        let header = HeaderValue::from_static("session=abc123; Path=/");
        let headers = vec![header];
        jar.set_cookies(&mut headers.iter(), &url);

        let cookies = CookieStore::cookies(&jar, &url).unwrap();
        assert_eq!(cookies.to_str().unwrap(), "session=abc123");
    }
}
