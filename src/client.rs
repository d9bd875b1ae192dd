//! The HTTP client and its per-request lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use http::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, LOCATION, REFERER, USER_AGENT};
use http::{Method, StatusCode};
use log::debug;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::body::Body;
use crate::connect::Transport;
use crate::cookie::{self, Cookie, CookieStore, Jar};
use crate::into_url::{expect_uri, try_uri, IntoUrl};
use crate::options::{JarSetting, OptionKey, Options, TransportConfig, Value, DEFAULTS};
use crate::redirect::{self, ActionKind};
use crate::request;
use crate::response::Response;
use crate::util;
use crate::{Error, Result};

/// A hook invoked with the fully built request immediately before
/// dispatch.
///
/// Any `Fn(&mut http::Request<Body>)` implements it.
pub trait BeforeRequest: Send + Sync {
    /// Inspect or adjust the request before it is sent.
    fn call(&self, req: &mut http::Request<Body>);
}

impl<F> BeforeRequest for F
where
    F: Fn(&mut http::Request<Body>) + Send + Sync,
{
    fn call(&self, req: &mut http::Request<Body>) {
        (self)(req)
    }
}

/// Client-level defaults: an option set plus default headers.
#[derive(Debug, Default)]
pub struct Config {
    /// Default options, merged under every request's one-time overrides.
    pub options: Options,
    /// Default headers, sent with every request unless overridden.
    pub headers: HeaderMap,
}

impl Config {
    /// An empty config.
    pub fn new() -> Config {
        Config::default()
    }

    /// Dynamic, string-keyed configuration entry.
    ///
    /// A known option name routes into the option set; an unknown name
    /// with a string value becomes a default header; anything else is
    /// silently dropped.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if OptionKey::from_name(name).is_some() {
            return self.options.set_named(name, value);
        }

        if let Value::Str(v) = value {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(Error::config)?;
            let value = HeaderValue::from_str(&v).map_err(Error::config)?;
            self.headers.insert(name, value);
        }

        Ok(())
    }
}

impl From<Options> for Config {
    fn from(options: Options) -> Config {
        Config {
            options,
            headers: HeaderMap::new(),
        }
    }
}

/// One-time state staged for the next request and cleared when it runs.
#[derive(Default)]
struct Overlay {
    options: Options,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    // a with_* call that failed validation; surfaced by the request so the
    // begin/end protocol still runs its course
    pending_error: Option<Error>,
}

struct ClientState {
    options: Options,
    headers: HeaderMap,
    overlay: Overlay,
    transport: Option<(Arc<Transport>, TransportConfig)>,
    jar: Option<(Option<Arc<dyn CookieStore>>, Option<JarSetting>)>,
    gate: Option<OwnedMutexGuard<()>>,
}

/// Everything one request needs, resolved from all option layers.
struct CallPlan {
    options: Options,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    transport: Arc<Transport>,
    jar: Option<Arc<dyn CookieStore>>,
}

impl std::fmt::Debug for CallPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallPlan")
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("transport", &self.transport)
            .field("jar", &self.jar.is_some())
            .finish_non_exhaustive()
    }
}

/// A fluent, reusable HTTP client.
///
/// A client carries its own default options and headers, caches the
/// expensive per-configuration resources (connection transport, cookie
/// jar), and hands out one-shot requests through the verb methods. All
/// configuration methods take `&self`; a client shared behind an `Arc` can
/// be used from many tasks at once.
///
/// ```no_run
/// # async fn run() -> Result<(), httpclient::Error> {
/// use httpclient::{Config, HttpClient, Options};
///
/// let client = HttpClient::with_defaults(Config::from(
///     Options::new().user_agent("my-crawler/1.0"),
/// ));
///
/// let mut res = client
///     .with_header("x-trace", "1")
///     .get("http://httpbin.org/get", &[("q", "rust")])
///     .await?;
///
/// println!("{}", res.text().await?);
/// # Ok(())
/// # }
/// ```
///
/// # Concurrency
///
/// A fluent sequence (`with_*` calls followed by one verb call) touches
/// shared one-time state. Callers racing such sequences on one client must
/// bracket them with [`begin`](HttpClient::begin), which locks the client
/// until the verb call has consumed the staged state:
///
/// ```no_run
/// # async fn run(client: &httpclient::HttpClient) -> Result<(), httpclient::Error> {
/// let res = client
///     .begin()
///     .await
///     .with_option("useragent", "task-7")
///     .get("http://httpbin.org/headers", &[])
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// A single verb call with no preceding `with_*` configuration needs no
/// `begin`; there is no shared mutable state to race on. The lock is
/// released before any network I/O, on every path — including preparation
/// failures — so a failed request never wedges the client.
pub struct HttpClient {
    state: Mutex<ClientState>,
    begin_gate: Arc<AsyncMutex<()>>,
}

impl HttpClient {
    /// Create a client with library-default options.
    pub fn new() -> HttpClient {
        HttpClient {
            state: Mutex::new(ClientState {
                options: Options::default(),
                headers: HeaderMap::new(),
                overlay: Overlay::default(),
                transport: None,
                jar: None,
                gate: None,
            }),
            begin_gate: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Create a client and merge `config` into its defaults.
    pub fn with_defaults(config: Config) -> HttpClient {
        let client = HttpClient::new();
        client.defaults(config);
        client
    }

    /// Merge options and headers into the client-level defaults,
    /// permanently.
    pub fn defaults(&self, config: Config) -> &HttpClient {
        let mut state = self.state.lock().unwrap();
        state.options.apply(&config.options);
        util::replace_headers(&mut state.headers, config.headers);
        self
    }

    /// Mark the beginning of a request sequence.
    ///
    /// Locks the client so the following `with_*` calls and the verb call
    /// that ends the sequence are atomic with respect to other tasks
    /// sharing this client. The verb call releases the lock, whether it
    /// succeeds or fails.
    pub async fn begin(&self) -> &HttpClient {
        let guard = self.begin_gate.clone().lock_owned().await;
        self.state.lock().unwrap().gate = Some(guard);
        self
    }

    /// Stage one-time option overrides for the next request.
    pub fn with_options(&self, options: Options) -> &HttpClient {
        self.state.lock().unwrap().overlay.options.apply(&options);
        self
    }

    /// Stage a one-time option override by name, from a loosely typed
    /// value.
    ///
    /// Unknown names are silently dropped. A value of the wrong type is
    /// reported as a configuration error by the request that ends this
    /// sequence.
    pub fn with_option<V: Into<Value>>(&self, name: &str, value: V) -> &HttpClient {
        let mut state = self.state.lock().unwrap();
        if let Err(err) = state.overlay.options.set_named(name, value.into()) {
            if state.overlay.pending_error.is_none() {
                state.overlay.pending_error = Some(err);
            }
        }
        self
    }

    /// Stage a one-time header for the next request.
    ///
    /// An invalid header name or value is reported as a configuration
    /// error by the request that ends this sequence.
    pub fn with_header<K, V>(&self, name: K, value: V) -> &HttpClient
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut state = self.state.lock().unwrap();
        let parsed = HeaderName::from_bytes(name.as_ref().as_bytes())
            .map_err(Error::config)
            .and_then(|name| {
                HeaderValue::from_str(value.as_ref())
                    .map_err(Error::config)
                    .map(|value| (name, value))
            });
        match parsed {
            Ok((name, value)) => {
                state.overlay.headers.insert(name, value);
            }
            Err(err) => {
                if state.overlay.pending_error.is_none() {
                    state.overlay.pending_error = Some(err);
                }
            }
        }
        self
    }

    /// Stage multiple one-time headers for the next request.
    pub fn with_headers(&self, headers: HeaderMap) -> &HttpClient {
        let mut state = self.state.lock().unwrap();
        util::replace_headers(&mut state.overlay.headers, headers);
        self
    }

    /// Stage a one-time cookie for the next request.
    ///
    /// With a cookie jar enabled the cookie is stored in the jar (and thus
    /// remembered); without one it rides the `Cookie` header of this
    /// request only.
    pub fn with_cookie(&self, cookie: Cookie<'static>) -> &HttpClient {
        self.state.lock().unwrap().overlay.cookies.push(cookie);
        self
    }

    /// Stage multiple one-time cookies for the next request.
    pub fn with_cookies<I>(&self, cookies: I) -> &HttpClient
    where
        I: IntoIterator<Item = Cookie<'static>>,
    {
        self.state
            .lock()
            .unwrap()
            .overlay
            .cookies
            .extend(cookies);
        self
    }

    /// Resolve all option layers and prepare (or reuse) the subordinate
    /// resources for one request.
    ///
    /// This is the critical section of the begin/end protocol: it consumes
    /// the one-time overlay and releases the begin gate on every path out,
    /// success or error, before any network I/O happens.
    fn prepare(&self) -> Result<CallPlan> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        let _gate = state.gate.take();
        let overlay = std::mem::take(&mut state.overlay);
        if let Some(err) = overlay.pending_error {
            return Err(err);
        }

        let options = Options::merged(&[&*DEFAULTS, &state.options, &overlay.options]);

        let mut headers = state.headers.clone();
        util::replace_headers(&mut headers, overlay.headers);

        // Reuse is keyed on the affecting option subset: a changed subset
        // rebuilds the resource. The rebuild is cached only when
        // client-level state alone produces the same subset, so a one-time
        // override gets a call-scoped resource without clobbering the
        // shared one.
        let client_level = Options::merged(&[&*DEFAULTS, &state.options]);

        let config = TransportConfig::from_options(&options);
        let transport = match state.transport {
            Some((ref cached, ref fingerprint)) if *fingerprint == config => cached.clone(),
            _ => {
                let built = Arc::new(Transport::prepare(&config)?);
                if TransportConfig::from_options(&client_level) == config {
                    state.transport = Some((built.clone(), config));
                }
                built
            }
        };

        let setting = options.cookie_jar.clone();
        let jar = match state.jar {
            Some((ref cached, ref fingerprint)) if *fingerprint == setting => cached.clone(),
            _ => {
                let built = prepare_jar(&setting);
                if client_level.cookie_jar == setting {
                    state.jar = Some((built.clone(), setting));
                }
                built
            }
        };

        Ok(CallPlan {
            options,
            headers,
            cookies: overlay.cookies,
            transport,
            jar,
        })
    }

    /// Resolve a request-building step, keeping the begin/end protocol
    /// intact: a failure still consumes the one-time overlay and releases
    /// the begin gate, the same as a failure inside `prepare`.
    fn checked<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let _ = self.prepare();
                Err(err)
            }
        }
    }

    /// Start a request, and get the response.
    ///
    /// This is the terminal of every fluent sequence; the convenience
    /// verbs all come through here. Explicit `headers` win over headers
    /// staged on the client, which in turn win over option-derived ones.
    pub async fn request<U: IntoUrl>(
        &self,
        method: Method,
        url: U,
        headers: Option<HeaderMap>,
        body: Option<Body>,
    ) -> Result<Response> {
        self.do_request(method, url, headers, body, None).await
    }

    async fn do_request<U: IntoUrl>(
        &self,
        method: Method,
        url: U,
        headers: Option<HeaderMap>,
        body: Option<Body>,
        content_type: Option<HeaderValue>,
    ) -> Result<Response> {
        // prepare() runs first: the overlay is consumed and the gate
        // released even when the url turns out to be invalid
        let plan = self.prepare()?;
        let url = url.into_url()?;
        execute(plan, method, url, headers, body, content_type).await
    }

    /// The GET request.
    ///
    /// `params` are appended to the query string of `url`.
    pub async fn get<U: IntoUrl>(&self, url: U, params: &[(&str, &str)]) -> Result<Response> {
        let url = self.checked(request::add_params(url.as_str(), params))?;
        self.request(Method::GET, url, None, None).await
    }

    /// The HEAD request.
    pub async fn head<U: IntoUrl>(&self, url: U, params: &[(&str, &str)]) -> Result<Response> {
        let url = self.checked(request::add_params(url.as_str(), params))?;
        self.request(Method::HEAD, url, None, None).await
    }

    /// The DELETE request.
    pub async fn delete<U: IntoUrl>(&self, url: U, params: &[(&str, &str)]) -> Result<Response> {
        let url = self.checked(request::add_params(url.as_str(), params))?;
        self.request(Method::DELETE, url, None, None).await
    }

    /// The OPTIONS request.
    pub async fn options<U: IntoUrl>(&self, url: U, params: &[(&str, &str)]) -> Result<Response> {
        let url = self.checked(request::add_params(url.as_str(), params))?;
        self.request(Method::OPTIONS, url, None, None).await
    }

    /// The TRACE request.
    pub async fn trace<U: IntoUrl>(&self, url: U, params: &[(&str, &str)]) -> Result<Response> {
        let url = self.checked(request::add_params(url.as_str(), params))?;
        self.request(Method::TRACE, url, None, None).await
    }

    /// The CONNECT request.
    pub async fn connect<U: IntoUrl>(&self, url: U, params: &[(&str, &str)]) -> Result<Response> {
        let url = self.checked(request::add_params(url.as_str(), params))?;
        self.request(Method::CONNECT, url, None, None).await
    }

    /// The POST request, with `params` as the body.
    ///
    /// Parameters are sent as an url-encoded form, unless any parameter
    /// key starts with `@` — then the key marks its value as a local file
    /// path and the whole request switches to `multipart/form-data`, the
    /// way [`post_multipart`](HttpClient::post_multipart) sends it.
    pub async fn post<U: IntoUrl>(&self, url: U, params: &[(&str, &str)]) -> Result<Response> {
        if request::has_file_param(params) {
            return self.post_multipart(url, params).await;
        }

        let (content_type, body) = self.checked(request::form_body(params))?;
        self.do_request(Method::POST, url, None, Some(body), Some(content_type))
            .await
    }

    /// The POST request, with the body encoded as `multipart/form-data`.
    ///
    /// `@`-prefixed parameter keys reference local files to upload; the
    /// files are read before any network I/O and an unreadable path is a
    /// configuration error.
    pub async fn post_multipart<U: IntoUrl>(
        &self,
        url: U,
        params: &[(&str, &str)],
    ) -> Result<Response> {
        let body = request::multipart_body(params).await;
        let (content_type, body) = self.checked(body)?;
        self.do_request(Method::POST, url, None, Some(body), Some(content_type))
            .await
    }

    /// The PUT request with a raw body.
    pub async fn put<U: IntoUrl, B: Into<Body>>(&self, url: U, body: B) -> Result<Response> {
        self.request(Method::PUT, url, None, Some(body.into())).await
    }

    /// The PATCH request with a raw body.
    pub async fn patch<U: IntoUrl, B: Into<Body>>(&self, url: U, body: B) -> Result<Response> {
        self.request(Method::PATCH, url, None, Some(body.into()))
            .await
    }

    /// The POST request with a JSON body.
    ///
    /// `data` is serialized with `serde_json` and the content type set to
    /// `application/json`, unless an explicit `Content-Type` header (e.g.
    /// a charset variant) overrides it.
    pub async fn post_json<U: IntoUrl, T: serde::Serialize>(
        &self,
        url: U,
        data: &T,
    ) -> Result<Response> {
        let (content_type, body) = self.checked(request::json_body(data))?;
        self.do_request(Method::POST, url, None, Some(body), Some(content_type))
            .await
    }

    /// The PUT request with a JSON body.
    pub async fn put_json<U: IntoUrl, T: serde::Serialize>(
        &self,
        url: U,
        data: &T,
    ) -> Result<Response> {
        let (content_type, body) = self.checked(request::json_body(data))?;
        self.do_request(Method::PUT, url, None, Some(body), Some(content_type))
            .await
    }

    /// The PATCH request with a JSON body.
    pub async fn patch_json<U: IntoUrl, T: serde::Serialize>(
        &self,
        url: U,
        data: &T,
    ) -> Result<Response> {
        let (content_type, body) = self.checked(request::json_body(data))?;
        self.do_request(Method::PATCH, url, None, Some(body), Some(content_type))
            .await
    }

    /// Get the cookie values (name to value) the client jar holds for
    /// `url`. Empty when no jar has been prepared yet or the jar is
    /// disabled.
    pub fn cookie_values<U: IntoUrl>(&self, url: U) -> HashMap<String, String> {
        let mut out = HashMap::new();

        let url = match url.into_url() {
            Ok(url) => url,
            Err(_) => return out,
        };

        let jar = {
            let state = self.state.lock().unwrap();
            state.jar.as_ref().and_then(|(jar, _)| jar.clone())
        };

        if let Some(jar) = jar {
            if let Some(header) = jar.cookies(&url) {
                if let Ok(value) = header.to_str() {
                    for pair in value.split("; ") {
                        if let Some(idx) = pair.find('=') {
                            out.insert(pair[..idx].to_owned(), pair[idx + 1..].to_owned());
                        }
                    }
                }
            }
        }

        out
    }

    /// Get the value of one cookie in the client jar, by name.
    pub fn cookie_value<U: IntoUrl>(&self, url: U, name: &str) -> Option<String> {
        self.cookie_values(url).remove(name)
    }
}

impl Default for HttpClient {
    fn default() -> HttpClient {
        HttpClient::new()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("HttpClient")
            .field("options", &state.options)
            .field("headers", &state.headers)
            .finish()
    }
}

fn prepare_jar(setting: &Option<JarSetting>) -> Option<Arc<dyn CookieStore>> {
    match setting {
        Some(JarSetting::Enabled(true)) => Some(Arc::new(Jar::default())),
        Some(JarSetting::Store(store)) => Some(store.clone()),
        Some(JarSetting::Enabled(false)) | None => None,
    }
}

async fn execute(
    plan: CallPlan,
    method: Method,
    url: Url,
    call_headers: Option<HeaderMap>,
    body: Option<Body>,
    content_type: Option<HeaderValue>,
) -> Result<Response> {
    let CallPlan {
        options,
        headers: base_headers,
        cookies,
        transport,
        jar,
    } = plan;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(
                Error::config(format!("unsupported url scheme: {}", scheme)).with_url(url)
            );
        }
    }

    let policy = redirect::prepare(&options);

    let mut headers = request::prepare_headers(&options, base_headers, call_headers)?;
    if let Some(content_type) = content_type {
        request::default_content_type(&mut headers, content_type);
    }

    // One-time cookies go through the jar when one is enabled (and are
    // thus remembered); otherwise they ride the Cookie header of this
    // request only.
    if !cookies.is_empty() {
        match jar {
            Some(ref jar) => {
                let values: Vec<HeaderValue> = cookies
                    .iter()
                    .filter_map(|c| HeaderValue::from_str(&c.to_string()).ok())
                    .collect();
                jar.set_cookies(&mut values.iter(), &url);
            }
            None => {
                let joined = cookies
                    .iter()
                    .map(|c| format!("{}={}", c.name(), c.value()))
                    .collect::<Vec<_>>()
                    .join("; ");
                if let Ok(value) = HeaderValue::from_str(&joined) {
                    headers.insert(COOKIE, value);
                }
            }
        }
    }

    // Build the full request once for the pre-send hook, then decompose it
    // for the redirect loop.
    let mut req = http::Request::builder()
        .method(method)
        .uri(expect_uri(&url))
        .body(body.unwrap_or_default())
        .map_err(Error::config)?;
    *req.headers_mut() = headers;

    if let Some(ref hook) = options.before_request {
        hook.call(&mut req);
    }

    let (parts, body) = req.into_parts();
    let mut method = parts.method;
    let mut headers = parts.headers;
    let mut url = match Url::parse(&parts.uri.to_string()) {
        Ok(url) => url,
        Err(e) => return Err(Error::config(e)),
    };

    // A replayable body is kept around for 307/308. `None` means no body,
    // `Some(None)` a streaming body that cannot be resent.
    let mut replay: Option<Option<bytes::Bytes>> = match body.as_reusable() {
        Some(bytes) if bytes.is_empty() => None,
        Some(bytes) => Some(Some(bytes.clone())),
        None => Some(None),
    };
    let mut body = Some(body);

    let dump_requests = options.debug.unwrap_or(false);
    let token = options.context.clone();
    let deadline = transport
        .total_timeout
        .map(|timeout| tokio::time::Instant::now() + timeout);

    let mut urls: Vec<Url> = Vec::new();

    loop {
        if let Some(ref jar) = jar {
            if headers.get(COOKIE).is_none() {
                add_cookie_header(&mut headers, &**jar, &url);
            }
        }

        if dump_requests {
            debug!("request dump:\n{}", request::dump(&method, &url, &headers));
        }

        let hop_body = match body.take() {
            Some(body) => body.into_engine(),
            None => match replay {
                Some(Some(ref bytes)) => hyper::Body::from(bytes.clone()),
                _ => hyper::Body::empty(),
            },
        };

        let mut hop_req = http::Request::builder()
            .method(method.clone())
            .uri(expect_uri(&url))
            .body(hop_body)
            .map_err(Error::config)?;
        *hop_req.headers_mut() = headers.clone();

        let res = send_hop(&transport, hop_req, deadline, token.as_ref(), &url).await?;

        // Response cookies are stored per hop, so a Set-Cookie on a
        // redirect is not lost.
        if let Some(ref jar) = jar {
            let mut set_cookies =
                cookie::extract_response_cookie_headers(res.headers()).peekable();
            if set_cookies.peek().is_some() {
                jar.set_cookies(&mut set_cookies, &url);
            }
        }

        let should_redirect = match res.status() {
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => {
                replay = None;
                match method {
                    Method::GET | Method::HEAD => {}
                    _ => {
                        method = Method::GET;
                    }
                }
                true
            }
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => match replay {
                Some(Some(_)) | None => true,
                Some(None) => false,
            },
            _ => false,
        };

        if should_redirect {
            let loc = res.headers().get(LOCATION).and_then(|val| {
                let loc = std::str::from_utf8(val.as_bytes())
                    .ok()
                    .and_then(|loc| url.join(loc).ok());

                // the Location must also be a valid http::Uri; if not, log
                // it and keep the response as-is
                let loc = loc.filter(|url| try_uri(url).is_some());

                if loc.is_none() {
                    debug!("Location header had an invalid URI: {:?}", val);
                }
                loc
            });

            if let Some(loc) = loc {
                urls.push(url.clone());
                let action = policy.check(res.status(), &loc, &urls);

                match action {
                    ActionKind::Follow => {
                        debug!("redirecting '{}' to '{}'", url, loc);

                        if loc.scheme() != "http" && loc.scheme() != "https" {
                            return Err(Error::config("unsupported url scheme").with_url(loc));
                        }

                        // Only the User-Agent header carries over onto the
                        // next hop; the Referer is re-derived when
                        // auto-referer is on, and cookies are re-read from
                        // the jar.
                        let user_agent = headers.get(USER_AGENT).cloned();
                        let mut next_headers = HeaderMap::new();
                        if let Some(user_agent) = user_agent {
                            next_headers.insert(USER_AGENT, user_agent);
                        }
                        if options.auto_referer.unwrap_or(false) {
                            if let Some(referer) = make_referer(&loc, &url) {
                                next_headers.insert(REFERER, referer);
                            }
                        }

                        headers = next_headers;
                        url = loc;
                        continue;
                    }
                    ActionKind::Stop => {
                        debug!("redirect policy disallowed redirection to '{}'", loc);
                    }
                    ActionKind::Error(err) => {
                        let response = Response::new(res, url.clone());
                        return Err(Error::redirect(err, url, response));
                    }
                }
            }
        }

        return Ok(Response::new(res, url));
    }
}

async fn send_hop(
    transport: &Transport,
    req: http::Request<hyper::Body>,
    deadline: Option<tokio::time::Instant>,
    token: Option<&CancellationToken>,
    url: &Url,
) -> Result<http::Response<hyper::Body>> {
    let fut = transport.client.request(req);

    let result = match (deadline, token) {
        (Some(deadline), Some(token)) => tokio::select! {
            _ = token.cancelled() => {
                return Err(Error::request(crate::error::Canceled).with_url(url.clone()));
            }
            res = tokio::time::timeout_at(deadline, fut) => match res {
                Ok(res) => res,
                Err(_elapsed) => {
                    return Err(Error::request(crate::error::TimedOut).with_url(url.clone()));
                }
            },
        },
        (Some(deadline), None) => match tokio::time::timeout_at(deadline, fut).await {
            Ok(res) => res,
            Err(_elapsed) => {
                return Err(Error::request(crate::error::TimedOut).with_url(url.clone()));
            }
        },
        (None, Some(token)) => tokio::select! {
            _ = token.cancelled() => {
                return Err(Error::request(crate::error::Canceled).with_url(url.clone()));
            }
            res = fut => res,
        },
        (None, None) => fut.await,
    };

    result.map_err(|e| Error::request(e).with_url(url.clone()))
}

fn make_referer(next: &Url, previous: &Url) -> Option<HeaderValue> {
    if next.scheme() == "http" && previous.scheme() == "https" {
        return None;
    }

    let mut referer = previous.clone();
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    referer.set_fragment(None);
    referer.as_str().parse().ok()
}

fn add_cookie_header(headers: &mut HeaderMap, cookie_store: &dyn CookieStore, url: &Url) {
    if let Some(header) = cookie_store.cookies(url) {
        headers.insert(COOKIE, header);
    }
}
