//! Transport preparation.
//!
//! A [`Transport`] bundles a `hyper::Client` with the timeouts resolved
//! from the transport-affecting options. Building one is the expensive part
//! of a request (TLS configuration, connection pool); the client caches and
//! reuses it for as long as those options stay unchanged.

use std::future::Future;
use std::io::{self, IoSlice};
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::uri::Scheme;
use http::Uri;
use hyper::client::connect::{Connected, Connection};
use hyper::client::HttpConnector;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;
use tower_service::Service;
use url::Url;

use crate::error::BoxError;
use crate::options::TransportConfig;
use crate::proxy::{self, ProxyScheme, ProxySelector};
use crate::Error;

/// The engine-side resources for one transport configuration.
#[derive(Clone)]
pub(crate) struct Transport {
    pub(crate) client: hyper::Client<Connector, hyper::Body>,
    pub(crate) total_timeout: Option<Duration>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("total_timeout", &self.total_timeout)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Build a transport from the transport-affecting option subset.
    ///
    /// Fails with a configuration error when an option value is unusable
    /// (unsupported proxy kind, malformed proxy address, bad bind
    /// interface, TLS setup failure). No I/O happens here.
    pub(crate) fn prepare(config: &TransportConfig) -> crate::Result<Transport> {
        let (connect_timeout, total_timeout) = config.resolve_timeouts();

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);

        if let Some(ref interface) = config.interface {
            let addr: IpAddr = interface
                .parse()
                .map_err(|_| Error::config("OPT_INTERFACE must be a local IP address"))?;
            http.set_local_address(Some(addr));
        }

        let mut tls = native_tls_crate::TlsConnector::builder();
        if config.unsafe_tls {
            tls.danger_accept_invalid_certs(true);
            tls.danger_accept_invalid_hostnames(true);
        }
        let tls = tls.build().map_err(Error::config)?;

        let intercept = if let Some(ref selector) = config.proxy_selector {
            Intercept::Selector(selector.clone())
        } else {
            if let Some(kind) = config.proxy_type {
                proxy::check_kind(kind).map_err(Error::config)?;
            }

            match config.proxy {
                Some(ref addr) => {
                    Intercept::Static(ProxyScheme::parse(addr).map_err(Error::config)?)
                }
                None => Intercept::None,
            }
        };

        let connector = Connector {
            http,
            tls: tokio_native_tls::TlsConnector::from(tls),
            intercept,
            timeout: connect_timeout,
        };

        let client = hyper::Client::builder().build(connector);

        Ok(Transport {
            client,
            total_timeout,
        })
    }
}

#[derive(Clone)]
enum Intercept {
    None,
    Static(ProxyScheme),
    Selector(Arc<dyn ProxySelector>),
}

#[derive(Clone)]
pub(crate) struct Connector {
    http: HttpConnector,
    tls: tokio_native_tls::TlsConnector,
    intercept: Intercept,
    timeout: Option<Duration>,
}

impl Connector {
    async fn connect(mut self, dst: Uri) -> Result<Conn, BoxError> {
        let proxy = match self.intercept {
            Intercept::None => None,
            Intercept::Static(ref scheme) => Some(scheme.clone()),
            Intercept::Selector(ref selector) => {
                let url = Url::parse(&dst.to_string())
                    .map_err(|e| format!("invalid request url: {}", e))?;
                match selector.select(&url)? {
                    Some(choice) => {
                        proxy::check_kind(choice.kind)?;
                        Some(ProxyScheme::parse(&choice.address)?)
                    }
                    None => None,
                }
            }
        };

        match proxy {
            Some(scheme) => self.connect_via_proxy(dst, scheme).await,
            None => {
                let io = self.http.call(dst.clone()).await?;
                self.maybe_handshake(dst, io, false).await
            }
        }
    }

    async fn connect_via_proxy(
        mut self,
        dst: Uri,
        scheme: ProxyScheme,
    ) -> Result<Conn, BoxError> {
        debug!("proxy({:?}) intercepts {:?}", scheme, dst);

        let proxy_dst = scheme.uri();
        let io = self.http.call(proxy_dst).await?;

        if dst.scheme() == Some(&Scheme::HTTPS) {
            trace!("tunneling HTTPS over proxy");
            let host = dst.host().ok_or("request uri has no host")?.to_owned();
            let port = dst.port_u16().unwrap_or(443);
            let tunneled = tunnel(io, &host, port, scheme.auth.as_ref()).await?;
            let stream = self.tls.connect(&host, tunneled).await?;
            return Ok(Conn {
                inner: Box::new(NativeTlsConn { inner: stream }),
                is_proxy: false,
            });
        }

        // Plain http through the proxy: hand hyper the proxy connection and
        // mark it, so the request is written in absolute form.
        self.maybe_handshake(dst, io, true).await
    }

    async fn maybe_handshake(
        self,
        dst: Uri,
        io: TcpStream,
        is_proxy: bool,
    ) -> Result<Conn, BoxError> {
        if dst.scheme() == Some(&Scheme::HTTPS) {
            let host = dst.host().ok_or("request uri has no host")?;
            let stream = self.tls.connect(host, io).await?;
            Ok(Conn {
                inner: Box::new(NativeTlsConn { inner: stream }),
                is_proxy,
            })
        } else {
            Ok(Conn {
                inner: Box::new(io),
                is_proxy,
            })
        }
    }
}

impl Service<Uri> for Connector {
    type Response = Conn;
    type Error = BoxError;
    type Future = Connecting;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        debug!("starting new connection: {:?}", dst);
        let timeout = self.timeout;
        Box::pin(with_timeout(self.clone().connect(dst), timeout))
    }
}

pub(crate) type Connecting = Pin<Box<dyn Future<Output = Result<Conn, BoxError>> + Send>>;

async fn with_timeout<T, F>(f: F, timeout: Option<Duration>) -> Result<T, BoxError>
where
    F: Future<Output = Result<T, BoxError>>,
{
    if let Some(to) = timeout {
        match tokio::time::timeout(to, f).await {
            Err(_elapsed) => Err(Box::new(crate::error::TimedOut) as BoxError),
            Ok(Ok(try_res)) => Ok(try_res),
            Ok(Err(e)) => Err(e),
        }
    } else {
        f.await
    }
}

/// Open a CONNECT tunnel through a proxy for an https destination.
async fn tunnel<T>(
    mut conn: T,
    host: &str,
    port: u16,
    auth: Option<&http::header::HeaderValue>,
) -> Result<T, BoxError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = format!(
        "\
         CONNECT {0}:{1} HTTP/1.1\r\n\
         Host: {0}:{1}\r\n\
         ",
        host, port
    )
    .into_bytes();

    if let Some(value) = auth {
        trace!("tunnel to {}:{} using basic auth", host, port);
        buf.extend_from_slice(b"Proxy-Authorization: ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");

    conn.write_all(&buf).await?;

    let mut buf = [0; 8192];
    let mut pos = 0;

    loop {
        let n = conn.read(&mut buf[pos..]).await?;

        if n == 0 {
            return Err("unexpected eof while tunneling".into());
        }
        pos += n;

        let recvd = &buf[..pos];
        if recvd.starts_with(b"HTTP/1.1 200") || recvd.starts_with(b"HTTP/1.0 200") {
            if recvd.ends_with(b"\r\n\r\n") {
                return Ok(conn);
            }
            if pos == buf.len() {
                return Err("proxy headers too long for tunnel".into());
            }
        // else read more
        } else if recvd.starts_with(b"HTTP/1.1 407") {
            return Err("proxy authentication required".into());
        } else {
            return Err("unsuccessful tunnel".into());
        }
    }
}

pub(crate) trait AsyncConn:
    AsyncRead + AsyncWrite + Connection + Send + Sync + Unpin + 'static
{
}

impl<T: AsyncRead + AsyncWrite + Connection + Send + Sync + Unpin + 'static> AsyncConn for T {}

type BoxConn = Box<dyn AsyncConn>;

/// A connection returned to hyper, remembering whether it talks to a proxy
/// so the request target can be written in absolute form.
pub(crate) struct Conn {
    inner: BoxConn,
    is_proxy: bool,
}

impl Connection for Conn {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.is_proxy)
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        bufs: &[IoSlice<'_>],
    ) -> Poll<Result<usize, io::Error>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// A TLS stream that reports the connection metadata of the socket under
/// it.
struct NativeTlsConn<T> {
    inner: TlsStream<T>,
}

impl<T: Connection + AsyncRead + AsyncWrite + Unpin> Connection for NativeTlsConn<T> {
    fn connected(&self) -> Connected {
        self.inner.get_ref().get_ref().get_ref().connected()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncRead for NativeTlsConn<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncWrite for NativeTlsConn<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
