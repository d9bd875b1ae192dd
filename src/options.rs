//! Client configuration options.
//!
//! Every tunable of the client is an enumerated option. Options are held in
//! an [`Options`] set with one typed field per option; absent fields simply
//! pass through when option layers are merged, and later layers win per
//! option. The same set is used for client-level defaults and for the
//! one-time overrides of a single request.
//!
//! For dynamic configuration (config files, string-keyed input) the
//! [`OptionKey`] registry maps option names to keys and [`Value`] carries a
//! loosely typed value; validation and conversion into the typed set happen
//! once, at that boundary. Unknown option names are silently dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;

use crate::client::BeforeRequest;
use crate::cookie::CookieStore;
use crate::proxy::{ProxyKind, ProxySelector};
use crate::redirect;

/// The default `User-Agent` header, sent when no user-agent option or
/// header overrides it.
pub const DEFAULT_USER_AGENT: &str = concat!("httpclient/", env!("CARGO_PKG_VERSION"));

/// Library-level defaults, the lowest layer of every merge.
pub(crate) static DEFAULTS: Lazy<Options> = Lazy::new(|| {
    Options::new()
        .follow_location(true)
        .max_redirects(10)
        .auto_referer(true)
        .user_agent(DEFAULT_USER_AGENT)
        .cookie_jar(true)
});

/// An enumerated configuration key.
///
/// Keys exist mainly for the string-keyed configuration boundary: a name
/// like `"timeout"` or `"OPT_TIMEOUT"` resolves to its key via
/// [`OptionKey::from_name`]. Typed code uses the [`Options`] builder methods
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum OptionKey {
    AutoReferer,
    FollowLocation,
    ConnectTimeout,
    ConnectTimeoutMs,
    MaxRedirects,
    ProxyType,
    Timeout,
    TimeoutMs,
    CookieJar,
    Interface,
    Proxy,
    Referer,
    UserAgent,
    RedirectPolicy,
    ProxySelector,
    Debug,
    UnsafeTls,
    Context,
    BeforeRequest,
}

impl OptionKey {
    /// Look up a key by name, case-insensitively, with or without the
    /// legacy `OPT_` prefix. Returns `None` for unrecognized names.
    pub fn from_name(name: &str) -> Option<OptionKey> {
        let upper = name.to_ascii_uppercase();
        let name = upper.strip_prefix("OPT_").unwrap_or(&upper);
        let key = match name {
            "AUTOREFERER" => OptionKey::AutoReferer,
            "FOLLOWLOCATION" => OptionKey::FollowLocation,
            "CONNECTTIMEOUT" => OptionKey::ConnectTimeout,
            "CONNECTTIMEOUT_MS" => OptionKey::ConnectTimeoutMs,
            "MAXREDIRS" => OptionKey::MaxRedirects,
            "PROXYTYPE" => OptionKey::ProxyType,
            "TIMEOUT" => OptionKey::Timeout,
            "TIMEOUT_MS" => OptionKey::TimeoutMs,
            "COOKIEJAR" => OptionKey::CookieJar,
            "INTERFACE" => OptionKey::Interface,
            "PROXY" => OptionKey::Proxy,
            "REFERER" => OptionKey::Referer,
            "USERAGENT" => OptionKey::UserAgent,
            "REDIRECT_POLICY" => OptionKey::RedirectPolicy,
            "PROXY_FUNC" => OptionKey::ProxySelector,
            "DEBUG" => OptionKey::Debug,
            "UNSAFE_TLS" => OptionKey::UnsafeTls,
            "CONTEXT" => OptionKey::Context,
            "BEFORE_REQUEST_FUNC" => OptionKey::BeforeRequest,
            _ => return None,
        };
        Some(key)
    }

    /// The canonical name of this key.
    pub fn name(&self) -> &'static str {
        match self {
            OptionKey::AutoReferer => "AUTOREFERER",
            OptionKey::FollowLocation => "FOLLOWLOCATION",
            OptionKey::ConnectTimeout => "CONNECTTIMEOUT",
            OptionKey::ConnectTimeoutMs => "CONNECTTIMEOUT_MS",
            OptionKey::MaxRedirects => "MAXREDIRS",
            OptionKey::ProxyType => "PROXYTYPE",
            OptionKey::Timeout => "TIMEOUT",
            OptionKey::TimeoutMs => "TIMEOUT_MS",
            OptionKey::CookieJar => "COOKIEJAR",
            OptionKey::Interface => "INTERFACE",
            OptionKey::Proxy => "PROXY",
            OptionKey::Referer => "REFERER",
            OptionKey::UserAgent => "USERAGENT",
            OptionKey::RedirectPolicy => "REDIRECT_POLICY",
            OptionKey::ProxySelector => "PROXY_FUNC",
            OptionKey::Debug => "DEBUG",
            OptionKey::UnsafeTls => "UNSAFE_TLS",
            OptionKey::Context => "CONTEXT",
            OptionKey::BeforeRequest => "BEFORE_REQUEST_FUNC",
        }
    }
}

/// A loosely typed option value for the string-keyed configuration
/// boundary.
///
/// Function-valued and handle-valued options (redirect policy, proxy
/// selector, cookie store, cancellation context, pre-send hook) cannot be
/// expressed as a `Value`; they are only settable through the typed
/// [`Options`] methods.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean value.
    Bool(bool),
    /// An integer value. Timeout options interpret it as seconds or
    /// milliseconds depending on the key.
    Int(i64),
    /// A string value.
    Str(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl Value {
    fn into_bool(self, key: OptionKey) -> crate::Result<bool> {
        match self {
            Value::Bool(v) => Ok(v),
            _ => Err(wrong_type(key, "a boolean")),
        }
    }

    fn into_int(self, key: OptionKey) -> crate::Result<i64> {
        match self {
            Value::Int(v) => Ok(v),
            _ => Err(wrong_type(key, "an integer")),
        }
    }

    fn into_duration(self, key: OptionKey, unit_ms: u64) -> crate::Result<Duration> {
        let n = self.into_int(key)?;
        if n < 0 {
            return Err(wrong_type(key, "a non-negative integer"));
        }
        Ok(Duration::from_millis(n as u64 * unit_ms))
    }

    fn into_str(self, key: OptionKey) -> crate::Result<String> {
        match self {
            Value::Str(v) => Ok(v),
            _ => Err(wrong_type(key, "a string")),
        }
    }
}

fn wrong_type(key: OptionKey, expected: &str) -> crate::Error {
    crate::Error::config(format!("OPT_{} must be {}", key.name(), expected))
}

/// How the cookie jar option was configured.
#[derive(Clone)]
pub(crate) enum JarSetting {
    Enabled(bool),
    Store(Arc<dyn CookieStore>),
}

impl PartialEq for JarSetting {
    fn eq(&self, other: &JarSetting) -> bool {
        match (self, other) {
            (JarSetting::Enabled(a), JarSetting::Enabled(b)) => a == b,
            (JarSetting::Store(a), JarSetting::Store(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for JarSetting {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JarSetting::Enabled(v) => f.debug_tuple("Enabled").field(v).finish(),
            JarSetting::Store(..) => f.pad("Store"),
        }
    }
}

/// A set of client options.
///
/// All fields are optional; an unset option falls through to the next lower
/// layer (one-time < client < library defaults) when the layers are merged
/// for a request.
///
/// ```
/// use std::time::Duration;
///
/// let options = httpclient::Options::new()
///     .timeout(Duration::from_secs(30))
///     .user_agent("my-crawler/1.0")
///     .follow_location(true)
///     .max_redirects(5);
/// ```
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) auto_referer: Option<bool>,
    pub(crate) follow_location: Option<bool>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) connect_timeout_ms: Option<Duration>,
    pub(crate) max_redirects: Option<i32>,
    pub(crate) proxy_type: Option<ProxyKind>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) timeout_ms: Option<Duration>,
    pub(crate) cookie_jar: Option<JarSetting>,
    pub(crate) interface: Option<String>,
    pub(crate) proxy: Option<String>,
    pub(crate) referer: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) redirect_policy: Option<redirect::Policy>,
    pub(crate) proxy_selector: Option<Arc<dyn ProxySelector>>,
    pub(crate) debug: Option<bool>,
    pub(crate) unsafe_tls: Option<bool>,
    pub(crate) context: Option<CancellationToken>,
    pub(crate) before_request: Option<Arc<dyn BeforeRequest>>,
}

impl Options {
    /// An empty option set.
    pub fn new() -> Options {
        Options::default()
    }

    /// Automatically set the `Referer` header when following a redirect.
    ///
    /// Enabled by default.
    pub fn auto_referer(mut self, enable: bool) -> Options {
        self.auto_referer = Some(enable);
        self
    }

    /// Follow `Location` headers of redirect responses.
    ///
    /// Enabled by default, with a maximum of 10 redirects.
    pub fn follow_location(mut self, enable: bool) -> Options {
        self.follow_location = Some(enable);
        self
    }

    /// Timeout for the connect phase only.
    ///
    /// If a total [`timeout`](Options::timeout) is also set and is shorter,
    /// the connect timeout is clamped down to it, so the connect phase can
    /// never outlast the whole call.
    pub fn connect_timeout(mut self, timeout: Duration) -> Options {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Millisecond-granularity connect timeout. Takes priority over
    /// [`connect_timeout`](Options::connect_timeout) when both are set,
    /// regardless of the layer each came from.
    pub fn connect_timeout_ms(mut self, millis: u64) -> Options {
        self.connect_timeout_ms = Some(Duration::from_millis(millis));
        self
    }

    /// Maximum number of redirects to follow. A value of zero (or less)
    /// refuses redirects outright.
    pub fn max_redirects(mut self, max: i32) -> Options {
        self.max_redirects = Some(max);
        self
    }

    /// The kind of proxy the [`proxy`](Options::proxy) address points at.
    ///
    /// Only [`ProxyKind::Http`] is currently supported; requesting any
    /// other kind is a configuration error, reported by the request that
    /// tries to use it.
    pub fn proxy_type(mut self, kind: ProxyKind) -> Options {
        self.proxy_type = Some(kind);
        self
    }

    /// Total timeout for the request, from connect start until the response
    /// head has arrived, across all redirect hops.
    pub fn timeout(mut self, timeout: Duration) -> Options {
        self.timeout = Some(timeout);
        self
    }

    /// Millisecond-granularity total timeout. Takes priority over
    /// [`timeout`](Options::timeout) when both are set.
    pub fn timeout_ms(mut self, millis: u64) -> Options {
        self.timeout_ms = Some(Duration::from_millis(millis));
        self
    }

    /// Enable or disable the shared cookie jar.
    ///
    /// Enabled by default. When disabled, cookies supplied per call are
    /// attached to that request only and nothing is remembered.
    pub fn cookie_jar(mut self, enable: bool) -> Options {
        self.cookie_jar = Some(JarSetting::Enabled(enable));
        self
    }

    /// Use an externally supplied cookie store instead of the default jar.
    pub fn cookie_store(mut self, store: Arc<dyn CookieStore>) -> Options {
        self.cookie_jar = Some(JarSetting::Store(store));
        self
    }

    /// Bind to a specific local address when connecting, given as an IP
    /// address string.
    pub fn interface<S: Into<String>>(mut self, addr: S) -> Options {
        self.interface = Some(addr.into());
        self
    }

    /// Send requests through a proxy at the given address. The address is
    /// prefixed with `http://` when it carries no scheme.
    pub fn proxy<S: Into<String>>(mut self, addr: S) -> Options {
        self.proxy = Some(addr.into());
        self
    }

    /// Set the `Referer` header of the request.
    pub fn referer<S: Into<String>>(mut self, referer: S) -> Options {
        self.referer = Some(referer.into());
        self
    }

    /// Set the `User-Agent` header of the request. The same value is
    /// carried onto every redirect hop.
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Options {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Use a custom redirect policy instead of the one synthesized from
    /// [`follow_location`](Options::follow_location) and
    /// [`max_redirects`](Options::max_redirects).
    pub fn redirect_policy(mut self, policy: redirect::Policy) -> Options {
        self.redirect_policy = Some(policy);
        self
    }

    /// Use a proxy selector to pick a proxy per request. Takes priority
    /// over a static [`proxy`](Options::proxy) address.
    pub fn proxy_selector<S>(mut self, selector: S) -> Options
    where
        S: ProxySelector + 'static,
    {
        self.proxy_selector = Some(Arc::new(selector));
        self
    }

    /// Dump every outgoing request to the `log` facade at debug level.
    pub fn debug(mut self, enable: bool) -> Options {
        self.debug = Some(enable);
        self
    }

    /// Disable TLS certificate verification.
    ///
    /// # Warning
    ///
    /// Anyone on the network can impersonate the server when verification
    /// is off. Only use this for testing.
    pub fn unsafe_tls(mut self, enable: bool) -> Options {
        self.unsafe_tls = Some(enable);
        self
    }

    /// Attach a cancellation context. Cancelling the token terminates an
    /// in-flight request immediately.
    pub fn context(mut self, token: CancellationToken) -> Options {
        self.context = Some(token);
        self
    }

    /// Invoke a hook with the fully built request immediately before
    /// dispatch.
    pub fn before_request<H>(mut self, hook: H) -> Options
    where
        H: BeforeRequest + 'static,
    {
        self.before_request = Some(Arc::new(hook));
        self
    }

    /// Set an option by key from a loosely typed [`Value`], converting and
    /// validating it. A value of the wrong type is a configuration error.
    pub fn set(&mut self, key: OptionKey, value: Value) -> crate::Result<()> {
        match key {
            OptionKey::AutoReferer => self.auto_referer = Some(value.into_bool(key)?),
            OptionKey::FollowLocation => self.follow_location = Some(value.into_bool(key)?),
            OptionKey::ConnectTimeout => {
                self.connect_timeout = Some(value.into_duration(key, 1000)?)
            }
            OptionKey::ConnectTimeoutMs => {
                self.connect_timeout_ms = Some(value.into_duration(key, 1)?)
            }
            OptionKey::MaxRedirects => self.max_redirects = Some(value.into_int(key)? as i32),
            OptionKey::ProxyType => {
                let code = value.into_int(key)?;
                let kind = ProxyKind::from_code(code)
                    .ok_or_else(|| wrong_type(key, "a known proxy type code"))?;
                self.proxy_type = Some(kind);
            }
            OptionKey::Timeout => self.timeout = Some(value.into_duration(key, 1000)?),
            OptionKey::TimeoutMs => self.timeout_ms = Some(value.into_duration(key, 1)?),
            OptionKey::CookieJar => {
                self.cookie_jar = Some(JarSetting::Enabled(value.into_bool(key)?))
            }
            OptionKey::Interface => self.interface = Some(value.into_str(key)?),
            OptionKey::Proxy => self.proxy = Some(value.into_str(key)?),
            OptionKey::Referer => self.referer = Some(value.into_str(key)?),
            OptionKey::UserAgent => self.user_agent = Some(value.into_str(key)?),
            OptionKey::Debug => self.debug = Some(value.into_bool(key)?),
            OptionKey::UnsafeTls => self.unsafe_tls = Some(value.into_bool(key)?),
            OptionKey::RedirectPolicy
            | OptionKey::ProxySelector
            | OptionKey::Context
            | OptionKey::BeforeRequest => {
                return Err(crate::Error::config(format!(
                    "OPT_{} cannot be set from a dynamic value",
                    key.name()
                )));
            }
        }
        Ok(())
    }

    /// Set an option by name. Unknown names are silently dropped;
    /// configuration from dynamic sources is best-effort for unrecognized
    /// names.
    pub fn set_named(&mut self, name: &str, value: Value) -> crate::Result<()> {
        match OptionKey::from_name(name) {
            Some(key) => self.set(key, value),
            None => Ok(()),
        }
    }

    /// Overlay `layer` onto `self`: every option set in `layer` wins.
    pub(crate) fn apply(&mut self, layer: &Options) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(
                    if layer.$field.is_some() {
                        self.$field = layer.$field.clone();
                    }
                )*
            };
        }

        overlay!(
            auto_referer,
            follow_location,
            connect_timeout,
            connect_timeout_ms,
            max_redirects,
            proxy_type,
            timeout,
            timeout_ms,
            cookie_jar,
            interface,
            proxy,
            referer,
            user_agent,
            redirect_policy,
            proxy_selector,
            debug,
            unsafe_tls,
            context,
            before_request,
        );
    }

    /// Merge option layers; later layers win per option, absent options
    /// pass through unchanged.
    pub(crate) fn merged(layers: &[&Options]) -> Options {
        let mut out = Options::default();
        for layer in layers {
            out.apply(layer);
        }
        out
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("Options");

        macro_rules! field {
            ($($name:ident),* $(,)?) => {
                $(
                    if let Some(ref v) = self.$name {
                        builder.field(stringify!($name), v);
                    }
                )*
            };
        }

        field!(
            auto_referer,
            follow_location,
            connect_timeout,
            connect_timeout_ms,
            max_redirects,
            proxy_type,
            timeout,
            timeout_ms,
            cookie_jar,
            interface,
            proxy,
            referer,
            user_agent,
            debug,
            unsafe_tls,
        );
        if self.redirect_policy.is_some() {
            builder.field("redirect_policy", &"..");
        }
        if self.proxy_selector.is_some() {
            builder.field("proxy_selector", &"..");
        }
        if self.context.is_some() {
            builder.field("context", &"..");
        }
        if self.before_request.is_some() {
            builder.field("before_request", &"..");
        }
        builder.finish()
    }
}

/// The transport-affecting option subset. A transport is reused between
/// calls exactly as long as this subset stays equal.
#[derive(Clone)]
pub(crate) struct TransportConfig {
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) connect_timeout_ms: Option<Duration>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) timeout_ms: Option<Duration>,
    pub(crate) proxy_type: Option<ProxyKind>,
    pub(crate) proxy: Option<String>,
    pub(crate) proxy_selector: Option<Arc<dyn ProxySelector>>,
    pub(crate) interface: Option<String>,
    pub(crate) unsafe_tls: bool,
}

impl TransportConfig {
    pub(crate) fn from_options(options: &Options) -> TransportConfig {
        TransportConfig {
            connect_timeout: options.connect_timeout,
            connect_timeout_ms: options.connect_timeout_ms,
            timeout: options.timeout,
            timeout_ms: options.timeout_ms,
            proxy_type: options.proxy_type,
            proxy: options.proxy.clone(),
            proxy_selector: options.proxy_selector.clone(),
            interface: options.interface.clone(),
            unsafe_tls: options.unsafe_tls.unwrap_or(false),
        }
    }

    /// Resolve the effective (connect, total) timeouts.
    ///
    /// The millisecond option beats the second-granularity one. If a total
    /// timeout is set and there is no connect timeout, or the connect
    /// timeout is larger, the connect timeout is clamped down to the total,
    /// preventing a connect phase that could outlast the whole call.
    pub(crate) fn resolve_timeouts(&self) -> (Option<Duration>, Option<Duration>) {
        let mut connect = self.connect_timeout_ms.or(self.connect_timeout);
        let total = self.timeout_ms.or(self.timeout);

        if let Some(total) = total {
            match connect {
                Some(c) if c > total => connect = Some(total),
                None => connect = Some(total),
                _ => {}
            }
        }

        (connect, total)
    }
}

impl PartialEq for TransportConfig {
    fn eq(&self, other: &TransportConfig) -> bool {
        let selector_eq = match (&self.proxy_selector, &other.proxy_selector) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };

        selector_eq
            && self.connect_timeout == other.connect_timeout
            && self.connect_timeout_ms == other.connect_timeout_ms
            && self.timeout == other.timeout
            && self.timeout_ms == other.timeout_ms
            && self.proxy_type == other.proxy_type
            && self.proxy == other.proxy
            && self.interface == other.interface
            && self.unsafe_tls == other.unsafe_tls
    }
}
