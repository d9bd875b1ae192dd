use std::error::Error as StdError;
use std::fmt;
use std::io;

use url::Url;

use crate::response::Response;

/// A `Result` alias where the `Err` case is `httpclient::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error type used where the error source is dynamic.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The Errors that may occur when configuring a client or processing a
/// request.
///
/// Note: Errors may include the full URL used to make the `Request`. If the
/// URL contains sensitive information (e.g. an API key as a query parameter),
/// be sure to remove it ([`without_url`](Error::without_url))
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    url: Option<Url>,
    response: Option<Response>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                url: None,
                response: None,
            }),
        }
    }

    pub(crate) fn config<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Config, Some(e))
    }

    pub(crate) fn request<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Request, Some(e))
    }

    pub(crate) fn redirect<E: Into<BoxError>>(e: E, url: Url, response: Response) -> Error {
        let mut err = Error::new(Kind::Redirect, Some(e)).with_url(url);
        err.inner.response = Some(response);
        err
    }

    pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Decode, Some(e))
    }

    /// Returns a possible URL related to this error.
    ///
    /// # Examples
    ///
    /// ```
    /// # async fn run() {
    /// // displays last stop of a redirect loop
    /// let response = httpclient::get("http://site.with.redirect.loop").await;
    /// if let Err(e) = response {
    ///     if e.is_redirect() {
    ///         if let Some(final_stop) = e.url() {
    ///             println!("redirect loop at {}", final_stop);
    ///         }
    ///     }
    /// }
    /// # }
    /// ```
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Add a url related to this error (overwriting any existing)
    pub fn with_url(mut self, url: Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    /// Strip the related url from this error (if, for example, it contains
    /// sensitive information)
    pub fn without_url(mut self) -> Self {
        self.inner.url = None;
        self
    }

    /// Returns the last received response, if the error carries one.
    ///
    /// A redirect refused by the redirect policy still produced a response
    /// (the 3xx hop the policy stopped at). The error signals "stopped
    /// here", not "nothing happened", so the status and headers of that
    /// final hop remain inspectable.
    pub fn response(&self) -> Option<&Response> {
        self.inner.response.as_ref()
    }

    /// Consumes the error, returning the last received response if the
    /// error carries one.
    pub fn into_response(self) -> Option<Response> {
        self.inner.response
    }

    /// Returns true if the error is a configuration error.
    ///
    /// Configuration errors are detected before any network I/O is
    /// attempted and are never retried.
    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, Kind::Config)
    }

    /// Returns true if the error came from the redirect policy.
    pub fn is_redirect(&self) -> bool {
        matches!(self.inner.kind, Kind::Redirect)
    }

    /// Returns true if the error is related to sending the request.
    pub fn is_request(&self) -> bool {
        matches!(self.inner.kind, Kind::Request)
    }

    /// Returns true if the error is related to decoding the response body.
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode)
    }

    /// Returns true if the error is related to a timeout.
    pub fn is_timeout(&self) -> bool {
        let mut source = self.source();

        while let Some(err) = source {
            if err.is::<TimedOut>() {
                return true;
            }

            if let Some(io) = err.downcast_ref::<io::Error>() {
                if io.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }

            source = err.source();
        }

        false
    }

    /// Returns true if the request was canceled through the cancellation
    /// context before it completed.
    pub fn is_canceled(&self) -> bool {
        let mut source = self.source();

        while let Some(err) = source {
            if err.is::<Canceled>() {
                return true;
            }

            source = err.source();
        }

        false
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("httpclient::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref url) = self.inner.url {
            builder.field("url", url);
        }

        if let Some(ref response) = self.inner.response {
            builder.field("response", response);
        }

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Config => f.write_str("configuration error")?,
            Kind::Request => f.write_str("error sending request")?,
            Kind::Redirect => f.write_str("error following redirect")?,
            Kind::Decode => f.write_str("error decoding response body")?,
        };

        if let Some(ref url) = self.inner.url {
            write!(f, " for url ({})", url)?;
        }

        if let Some(ref e) = self.inner.source {
            write!(f, ": {}", e)?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Config,
    Request,
    Redirect,
    Decode,
}

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("operation timed out")
    }
}

impl StdError for TimedOut {}

#[derive(Debug)]
pub(crate) struct Canceled;

impl fmt::Display for Canceled {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("operation canceled")
    }
}

impl StdError for Canceled {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_source_chain() {
        let root = Error::new(Kind::Request, None::<Error>);
        assert!(root.source().is_none());

        let link = Error::request(root);
        assert!(link.source().is_some());
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn mem_size_of() {
        use std::mem::size_of;
        assert_eq!(size_of::<Error>(), size_of::<usize>());
    }

    #[test]
    fn is_timeout() {
        let err = Error::request(super::TimedOut);
        assert!(err.is_timeout());

        let io = io::Error::from(io::ErrorKind::TimedOut);
        let nested = Error::request(io);
        assert!(nested.is_timeout());
    }

    #[test]
    fn is_canceled() {
        let err = Error::request(super::Canceled);
        assert!(err.is_canceled());
        assert!(!err.is_timeout());
    }

    #[test]
    fn display_carries_url_and_source() {
        let url = Url::parse("http://example.local/a").unwrap();
        let err = Error::request(TimedOut).with_url(url);
        assert_eq!(
            err.to_string(),
            "error sending request for url (http://example.local/a): operation timed out"
        );
    }
}
