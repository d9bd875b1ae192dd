#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

//! # httpclient
//!
//! The `httpclient` crate provides a fluent, convenience-first HTTP
//! [`HttpClient`][client] on top of hyper.
//!
//! It handles many of the things that most people just expect an HTTP
//! client to do for them:
//!
//! - Fluent per-request configuration over reusable client defaults
//! - Plain bodies, JSON, urlencoded forms, multipart file uploads
//! - Customizable [redirect policy](#redirects)
//! - HTTP [proxies](#proxies)
//! - Cookies, persisted in a jar across requests
//! - Transparent gzip response decoding
//!
//! ## Making a GET request
//!
//! For a single request, you can use the [`get`][get] shortcut method.
//!
//! ```rust
//! # async fn run() -> Result<(), httpclient::Error> {
//! let body = httpclient::get("https://www.rust-lang.org")
//!     .await?
//!     .text()
//!     .await?;
//!
//! println!("body = {:?}", body);
//! # Ok(())
//! # }
//! ```
//!
//! **NOTE**: If you plan to perform multiple requests, it is best to create
//! an [`HttpClient`][client] and reuse it: the client caches its connection
//! transport and cookie jar between requests for as long as the options
//! affecting them stay unchanged.
//!
//! ## Fluent configuration
//!
//! Client-level defaults are set once with
//! [`defaults`][HttpClient::defaults]; one-time overrides are staged with
//! the `with_*` methods and consumed by the request that ends the
//! sequence, whether it succeeds or fails:
//!
//! ```rust
//! # async fn run() -> Result<(), httpclient::Error> {
//! use httpclient::{Config, HttpClient, Options};
//!
//! let client = HttpClient::with_defaults(Config::from(
//!     Options::new().user_agent("my-crawler/1.0"),
//! ));
//!
//! let res = client
//!     .with_option("followlocation", false)
//!     .with_header("x-request-id", "42")
//!     .get("http://httpbin.org/get", &[("q", "rust")])
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! When several tasks share one client, bracket each fluent sequence with
//! [`begin`][HttpClient::begin] so the staged state and the verb call are
//! atomic; the verb call always releases the client again.
//!
//! ## Making POST requests (or setting request bodies)
//!
//! A form POST takes its parameters directly; a parameter key starting
//! with `@` marks its value as a file path and switches the request to
//! `multipart/form-data`:
//!
//! ```rust
//! # async fn run() -> Result<(), httpclient::Error> {
//! let client = httpclient::HttpClient::new();
//!
//! // urlencoded form
//! let res = client
//!     .post("http://httpbin.org/post", &[("comment", "hello")])
//!     .await?;
//!
//! // multipart, because of the file-marked key
//! let res = client
//!     .post(
//!         "http://httpbin.org/post",
//!         &[("comment", "hello"), ("@upload", "README.md")],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### JSON
//!
//! The `*_json` verbs serialize any [`serde::Serialize`] value and set the
//! content type:
//!
//! ```rust
//! # use std::collections::HashMap;
//! # async fn run() -> Result<(), httpclient::Error> {
//! let mut map = HashMap::new();
//! map.insert("lang", "rust");
//!
//! let client = httpclient::HttpClient::new();
//! let res = client.post_json("http://httpbin.org/post", &map).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Redirects
//!
//! By default the client follows up to 10 redirects, carrying the
//! `User-Agent` header across hops. The follow-location and max-redirects
//! options tune this, and a [`redirect::Policy`] replaces it entirely. A
//! redirect refused by policy is reported as an error that still carries
//! the last received response for inspection.
//!
//! ## Proxies
//!
//! A plain HTTP proxy is configured with the proxy option (the address is
//! prefixed with `http://` when it has no scheme), or per request with a
//! [`ProxySelector`]. Https destinations are tunneled through the proxy
//! with CONNECT.
//!
//! ## Cookies
//!
//! A cookie jar is enabled by default: response cookies are stored per URL
//! and sent back on subsequent requests from the same client. Disable it
//! with the cookie-jar option, or supply your own [`cookie::CookieStore`].
//!
//! [client]: ./struct.HttpClient.html
//! [get]: ./fn.get.html

pub use http::header;
pub use http::Method;
pub use http::{StatusCode, Version};
pub use url::Url;

pub use self::body::Body;
pub use self::client::{BeforeRequest, Config, HttpClient};
pub use self::error::{BoxError, Error, Result};
pub use self::into_url::IntoUrl;
pub use self::options::{OptionKey, Options, Value, DEFAULT_USER_AGENT};
pub use self::proxy::{ProxyChoice, ProxyKind, ProxySelector};
pub use self::response::Response;

mod body;
mod client;
pub mod cookie;
mod connect;
mod error;
mod into_url;
mod options;
mod proxy;
pub mod redirect;
mod request;
mod response;
mod util;

/// Shortcut method to quickly make a GET request with a fresh client.
///
/// See also the methods on the [`httpclient::Response`](./struct.Response.html)
/// type.
///
/// **NOTE**: This function creates a new internal `HttpClient` on each
/// call, and so should not be used if making many requests. Create an
/// [`HttpClient`](./struct.HttpClient.html) instead.
///
/// # Examples
///
/// ```rust
/// # async fn run() -> Result<(), httpclient::Error> {
/// let body = httpclient::get("https://www.rust-lang.org")
///     .await?
///     .text()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// This function fails if:
///
/// - the supplied `Url` cannot be parsed
/// - there was an error while sending the request
/// - a redirect was refused by policy
pub async fn get<U: IntoUrl>(url: U) -> crate::Result<Response> {
    HttpClient::new().get(url, &[]).await
}
