use std::fmt;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use http::{HeaderMap, StatusCode, Version};
use mime::Mime;
use serde::de::DeserializeOwned;
use url::Url;

use crate::cookie;
use crate::header::CONTENT_ENCODING;
use crate::Error;

/// A decorated response to a submitted request.
///
/// # Body reads are single-use
///
/// The underlying body stream is consumed by the first of
/// [`bytes`](Response::bytes), [`text`](Response::text) or
/// [`json`](Response::json); a second read yields an empty result rather
/// than the data again. Read the body once and keep what you need.
pub struct Response {
    res: http::Response<hyper::Body>,
    url: Url,
}

impl Response {
    pub(crate) fn new(res: http::Response<hyper::Body>, url: Url) -> Response {
        Response { res, url }
    }

    /// Get the `StatusCode` of this `Response`.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.res.status()
    }

    /// Get the HTTP `Version` of this `Response`.
    #[inline]
    pub fn version(&self) -> Version {
        self.res.version()
    }

    /// Get the `Headers` of this `Response`.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.res.headers()
    }

    /// Get a mutable reference to the `Headers` of this `Response`.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.res.headers_mut()
    }

    /// Get the final `Url` of this `Response`, after any followed
    /// redirects.
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the content length of the response body, if known.
    pub fn content_length(&self) -> Option<u64> {
        use hyper::body::HttpBody;

        HttpBody::size_hint(self.res.body()).exact()
    }

    /// Retrieve the cookies contained in the response.
    ///
    /// Note that invalid 'Set-Cookie' headers will be ignored.
    pub fn cookies(&self) -> impl Iterator<Item = cookie::Cookie<'_>> {
        cookie::extract_response_cookies(self.res.headers()).filter_map(Result::ok)
    }

    // body methods

    /// Read the full response body as `Bytes`.
    ///
    /// A body sent with `Content-Encoding: gzip` is transparently
    /// decompressed; any other encoding passes through unchanged. The
    /// response headers are left exactly as received.
    pub async fn bytes(&mut self) -> crate::Result<Bytes> {
        let body = std::mem::replace(self.res.body_mut(), hyper::Body::empty());
        let full = hyper::body::to_bytes(body)
            .await
            .map_err(|e| Error::request(e).with_url(self.url.clone()))?;

        if full.is_empty() || !self.is_gzipped() {
            return Ok(full);
        }

        self.gunzip(&full).await.map(Bytes::from)
    }

    /// Read the full response body as text.
    ///
    /// The encoding is taken from the `charset` parameter of the
    /// `Content-Type` header, defaulting to utf-8; malformed sequences are
    /// replaced with [`char::REPLACEMENT_CHARACTER`].
    pub async fn text(&mut self) -> crate::Result<String> {
        let content_type = self
            .headers()
            .get(crate::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Mime>().ok());
        let encoding = content_type
            .as_ref()
            .and_then(|mime| mime.get_param("charset").map(|charset| charset.as_str()))
            .and_then(|name| Encoding::for_label(name.as_bytes()))
            .unwrap_or(UTF_8);

        let full = self.bytes().await?;

        let (text, _, _) = encoding.decode(&full);
        Ok(text.into_owned())
    }

    /// Try to deserialize the response body as JSON.
    ///
    /// # Errors
    ///
    /// This method fails whenever the response body is not in JSON format
    /// or it cannot be properly deserialized to the target type `T`.
    ///
    /// # Example
    ///
    /// ```
    /// # use serde::Deserialize;
    /// #[derive(Deserialize)]
    /// struct Ip {
    ///     origin: String,
    /// }
    ///
    /// # async fn run() -> Result<(), httpclient::Error> {
    /// let client = httpclient::HttpClient::new();
    /// let ip: Ip = client.get("http://httpbin.org/ip", &[]).await?.json().await?;
    ///
    /// println!("ip: {}", ip.origin);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn json<T: DeserializeOwned>(&mut self) -> crate::Result<T> {
        let full = self.bytes().await?;

        serde_json::from_slice(&full).map_err(|e| Error::decode(e).with_url(self.url.clone()))
    }

    fn is_gzipped(&self) -> bool {
        self.res
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false)
    }

    async fn gunzip(&self, data: &[u8]) -> crate::Result<Vec<u8>> {
        use async_compression::tokio::bufread::GzipDecoder;
        use tokio::io::AsyncReadExt;

        let mut decoder = GzipDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .await
            .map_err(|e| Error::decode(e).with_url(self.url.clone()))?;
        Ok(out)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", self.url())
            .field("status", &self.status())
            .field("headers", self.headers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(
        builder: http::response::Builder,
        body: impl Into<hyper::Body>,
    ) -> Response {
        let res = builder.body(body.into()).unwrap();
        Response::new(res, Url::parse("http://example.local/").unwrap())
    }

    #[tokio::test]
    async fn second_read_is_empty() {
        let mut res = response_with(http::Response::builder(), "hello");

        assert_eq!(res.bytes().await.unwrap().as_ref(), b"hello");
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"");
        assert_eq!(res.text().await.unwrap(), "");
    }

    #[tokio::test]
    async fn plain_bodies_pass_through() {
        let mut res = response_with(
            http::Response::builder().header(CONTENT_ENCODING, "br"),
            "not really brotli",
        );
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"not really brotli");
    }

    #[tokio::test]
    async fn gzip_bodies_are_decoded() {
        use libflate::gzip::Encoder;
        use std::io::Write;

        let mut encoder = Encoder::new(Vec::new()).unwrap();
        encoder.write_all(b"hello gzip").unwrap();
        let gzipped = encoder.finish().into_result().unwrap();

        let mut res = response_with(
            http::Response::builder().header(CONTENT_ENCODING, "gzip"),
            gzipped,
        );
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"hello gzip");
    }

    #[tokio::test]
    async fn empty_gzip_body_stays_empty() {
        let mut res = response_with(
            http::Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header(CONTENT_ENCODING, "gzip"),
            hyper::Body::empty(),
        );
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"");
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let mut res = response_with(http::Response::builder(), "{not json");
        let err = res.json::<serde_json::Value>().await.unwrap_err();
        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn text_respects_charset() {
        let mut res = response_with(
            http::Response::builder()
                .header(crate::header::CONTENT_TYPE, "text/plain; charset=gbk"),
            vec![0xd6u8, 0xd0],
        );
        assert_eq!(res.text().await.unwrap(), "\u{4e2d}");
    }
}
