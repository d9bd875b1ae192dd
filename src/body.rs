use std::fmt;

use bytes::Bytes;

/// The body of a request.
///
/// Bodies built from buffered data (strings, byte vectors) are reusable:
/// they can be replayed when a 307/308 redirect requires resending. A body
/// wrapping an arbitrary stream is sent as-is and cannot be replayed; a
/// redirect that would need to resend it returns the redirect response
/// instead of following it.
pub struct Body {
    inner: Inner,
}

enum Inner {
    Reusable(Bytes),
    Streaming(hyper::Body),
}

impl Body {
    /// An empty body.
    pub fn empty() -> Body {
        Body {
            inner: Inner::Reusable(Bytes::new()),
        }
    }

    /// Wrap an engine body stream. The result is not replayable.
    pub fn wrap(body: hyper::Body) -> Body {
        Body {
            inner: Inner::Streaming(body),
        }
    }

    /// The buffered contents, if this body is replayable.
    pub(crate) fn as_reusable(&self) -> Option<&Bytes> {
        match self.inner {
            Inner::Reusable(ref bytes) => Some(bytes),
            Inner::Streaming(..) => None,
        }
    }

    pub(crate) fn into_engine(self) -> hyper::Body {
        match self.inner {
            Inner::Reusable(bytes) if bytes.is_empty() => hyper::Body::empty(),
            Inner::Reusable(bytes) => hyper::Body::from(bytes),
            Inner::Streaming(body) => body,
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Body {
        Body {
            inner: Inner::Reusable(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(vec: Vec<u8>) -> Body {
        Body {
            inner: Inner::Reusable(vec.into()),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Body {
        Body {
            inner: Inner::Reusable(s.into()),
        }
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Body {
        Body {
            inner: Inner::Reusable(Bytes::from_static(s.as_bytes())),
        }
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Body {
        Body {
            inner: Inner::Reusable(Bytes::from_static(bytes)),
        }
    }
}

impl From<hyper::Body> for Body {
    fn from(body: hyper::Body) -> Body {
        Body::wrap(body)
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner {
            Inner::Reusable(ref bytes) => f.debug_tuple("Body").field(&bytes.len()).finish(),
            Inner::Streaming(..) => f.pad("Body(Streaming)"),
        }
    }
}
