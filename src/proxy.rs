//! Proxy configuration.
//!
//! A proxy is configured either as a static address through
//! [`Options::proxy`](crate::Options::proxy) or per request through a
//! [`ProxySelector`]. Only plain HTTP proxies are supported; the other
//! kinds are enumerated for the dynamic configuration boundary and rejected
//! when a request tries to use them.

use std::fmt;

use http::header::HeaderValue;
use http::uri::{Authority, PathAndQuery, Scheme, Uri};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::BoxError;

/// The supported kinds of proxy servers, with their curl-compatible codes
/// at the dynamic configuration boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// A plain HTTP proxy. The only kind currently supported.
    Http,
    /// A SOCKS4 proxy. Enumerated, not supported.
    Socks4,
    /// A SOCKS5 proxy. Enumerated, not supported.
    Socks5,
    /// A SOCKS4a proxy. Enumerated, not supported.
    Socks4a,
}

impl ProxyKind {
    /// Resolve a curl-style proxy type code.
    pub fn from_code(code: i64) -> Option<ProxyKind> {
        match code {
            0 => Some(ProxyKind::Http),
            4 => Some(ProxyKind::Socks4),
            5 => Some(ProxyKind::Socks5),
            6 => Some(ProxyKind::Socks4a),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ProxyKind::Http => "HTTP",
            ProxyKind::Socks4 => "SOCKS4",
            ProxyKind::Socks5 => "SOCKS5",
            ProxyKind::Socks4a => "SOCKS4A",
        };
        f.write_str(name)
    }
}

/// A proxy picked by a [`ProxySelector`] for one request.
#[derive(Debug, Clone)]
pub struct ProxyChoice {
    pub(crate) kind: ProxyKind,
    pub(crate) address: String,
}

impl ProxyChoice {
    /// A plain HTTP proxy at `address` (`host:port`, scheme optional).
    pub fn http<S: Into<String>>(address: S) -> ProxyChoice {
        ProxyChoice {
            kind: ProxyKind::Http,
            address: address.into(),
        }
    }

    /// A proxy of an explicit kind. Kinds other than
    /// [`ProxyKind::Http`] fail the request that tries to connect through
    /// them.
    pub fn new<S: Into<String>>(kind: ProxyKind, address: S) -> ProxyChoice {
        ProxyChoice {
            kind,
            address: address.into(),
        }
    }
}

/// Picks a proxy per request.
///
/// This is the strategy-object form of a proxy callback: return
/// `Ok(Some(choice))` to route the request through a proxy, `Ok(None)` to
/// connect directly, or an error to fail the request.
///
/// Any `Fn(&Url) -> Result<Option<ProxyChoice>, BoxError>` implements it:
///
/// ```
/// use httpclient::{BoxError, Options, ProxyChoice, Url};
///
/// fn pick(url: &Url) -> Result<Option<ProxyChoice>, BoxError> {
///     if url.host_str() == Some("internal.local") {
///         Ok(None)
///     } else {
///         Ok(Some(ProxyChoice::http("127.0.0.1:8080")))
///     }
/// }
///
/// let options = Options::new().proxy_selector(pick);
/// ```
pub trait ProxySelector: Send + Sync {
    /// Pick a proxy for a request to `url`.
    fn select(&self, url: &Url) -> Result<Option<ProxyChoice>, BoxError>;
}

impl<F> ProxySelector for F
where
    F: Fn(&Url) -> Result<Option<ProxyChoice>, BoxError> + Send + Sync,
{
    fn select(&self, url: &Url) -> Result<Option<ProxyChoice>, BoxError> {
        (self)(url)
    }
}

/// A validated proxy endpoint the connector can dial.
#[derive(Clone)]
pub(crate) struct ProxyScheme {
    pub(crate) host: Authority,
    pub(crate) auth: Option<HeaderValue>,
}

impl ProxyScheme {
    /// Parse a proxy address string. An address without a scheme gets the
    /// default `http://` prefix; basic auth credentials are taken from the
    /// userinfo component.
    pub(crate) fn parse(addr: &str) -> Result<ProxyScheme, BoxError> {
        let with_scheme;
        let addr = if addr.contains("://") {
            addr
        } else {
            with_scheme = format!("http://{}", addr);
            &with_scheme
        };

        let url = Url::parse(addr).map_err(|e| format!("invalid proxy address: {}", e))?;
        if url.scheme() != "http" {
            return Err(format!("unsupported proxy scheme: {}", url.scheme()).into());
        }

        let host = url
            .host_str()
            .ok_or("proxy address is missing a host")?;
        let port = url.port().unwrap_or(80);
        let host: Authority = format!("{}:{}", host, port).parse()?;

        let auth = if url.username().is_empty() {
            None
        } else {
            let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
            let username = decode(url.username());
            let password = url.password().map(decode);
            Some(basic_auth(&username, password.as_deref()))
        };

        Ok(ProxyScheme { host, auth })
    }

    /// The URI of the proxy itself, used as the dial target.
    pub(crate) fn uri(&self) -> Uri {
        let mut builder = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.host.clone());
        builder = builder.path_and_query(PathAndQuery::from_static("/"));
        builder.build().expect("proxy authority is a valid uri")
    }
}

impl fmt::Debug for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "http://{}", self.host)
    }
}

/// A `Proxy-Authorization` value for the credentials of a proxy URL.
fn basic_auth(username: &str, password: Option<&str>) -> HeaderValue {
    use base64::prelude::{Engine as _, BASE64_STANDARD};

    let credentials = format!("{}:{}", username, password.unwrap_or(""));
    let encoded = format!("Basic {}", BASE64_STANDARD.encode(credentials));

    let mut header =
        HeaderValue::from_str(&encoded).expect("base64 is always a valid header value");
    header.set_sensitive(true);
    header
}

/// Validate a proxy kind: only plain HTTP proxies are currently supported.
pub(crate) fn check_kind(kind: ProxyKind) -> Result<(), BoxError> {
    if kind == ProxyKind::Http {
        Ok(())
    } else {
        Err(format!("only HTTP proxies are currently supported, got {}", kind).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prefixes_default_scheme() {
        let scheme = ProxyScheme::parse("127.0.0.1:1080").unwrap();
        assert_eq!(scheme.host.as_str(), "127.0.0.1:1080");
        assert!(scheme.auth.is_none());
    }

    #[test]
    fn parse_keeps_explicit_scheme() {
        let scheme = ProxyScheme::parse("http://proxy.local").unwrap();
        assert_eq!(scheme.host.as_str(), "proxy.local:80");
    }

    #[test]
    fn parse_rejects_non_http_scheme() {
        assert!(ProxyScheme::parse("socks5://127.0.0.1:1080").is_err());
    }

    #[test]
    fn parse_extracts_basic_auth() {
        let scheme = ProxyScheme::parse("Aladdin:open%20sesame@proxy.local:3128").unwrap();
        assert_eq!(scheme.host.as_str(), "proxy.local:3128");
        let auth = scheme.auth.unwrap();
        assert_eq!(auth, "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
        assert!(auth.is_sensitive());
    }

    #[test]
    fn basic_auth_without_a_password() {
        let auth = basic_auth("user", None);
        assert_eq!(auth, "Basic dXNlcjo=");
    }

    #[test]
    fn only_http_kind_is_supported() {
        assert!(check_kind(ProxyKind::Http).is_ok());
        assert!(check_kind(ProxyKind::Socks5).is_err());
        assert_eq!(ProxyKind::from_code(0), Some(ProxyKind::Http));
        assert_eq!(ProxyKind::from_code(5), Some(ProxyKind::Socks5));
        assert_eq!(ProxyKind::from_code(1), None);
    }
}
