//! Redirect Handling
//!
//! By default, a client will automatically handle HTTP redirects, having a
//! maximum redirect chain of 10 hops. To customize this behavior, the
//! follow-location and max-redirects options can be adjusted, or a custom
//! `redirect::Policy` supplied.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use url::Url;

use crate::error::BoxError;
use crate::options::Options;

/// A type that controls the policy on how to handle the following of
/// redirects.
///
/// The synthesized default refuses redirects when following is disabled or
/// the maximum is zero, and stops a chain once it reaches the configured
/// maximum number of hops.
///
/// - `custom` can be used to create a customized policy.
#[derive(Clone)]
pub struct Policy {
    inner: PolicyKind,
}

/// A type that holds information on the next request and previous requests
/// in redirect chain.
#[derive(Debug)]
pub struct Attempt<'a> {
    status: StatusCode,
    next: &'a Url,
    previous: &'a [Url],
}

/// An action to perform when a redirect status code is found.
#[derive(Debug)]
pub struct Action {
    inner: ActionKind,
}

impl Policy {
    /// Create a `Policy` from the follow flag and the maximum number of
    /// redirects.
    ///
    /// With following disabled or a maximum of zero (or less), the first
    /// redirect already fails; otherwise an `Error` is returned once the
    /// chain reaches the maximum.
    pub fn limited(follow: bool, max: i32) -> Self {
        Self {
            inner: PolicyKind::Limit { follow, max },
        }
    }

    /// Create a custom `Policy` using the passed function.
    ///
    /// # Note
    ///
    /// The default `Policy` handles a maximum loop chain, but the custom
    /// variant does not do that for you automatically. The custom policy
    /// should have some way of handling those.
    ///
    /// Information on the next request and previous requests can be found
    /// on the [`Attempt`] argument passed to the closure.
    ///
    /// Actions can be conveniently created from methods on the
    /// [`Attempt`].
    ///
    /// # Example
    ///
    /// ```rust
    /// # use httpclient::{Error, redirect};
    /// #
    /// # fn run() -> Result<(), Error> {
    /// let custom = redirect::Policy::custom(|attempt| {
    ///     if attempt.previous().len() > 5 {
    ///         attempt.error("too many redirects")
    ///     } else if attempt.url().host_str() == Some("example.domain") {
    ///         // prevent redirects to 'example.domain'
    ///         attempt.stop()
    ///     } else {
    ///         attempt.follow()
    ///     }
    /// });
    /// let options = httpclient::Options::new().redirect_policy(custom);
    /// # Ok(())
    /// # }
    /// ```
    pub fn custom<T>(policy: T) -> Self
    where
        T: Fn(Attempt) -> Action + Send + Sync + 'static,
    {
        Self {
            inner: PolicyKind::Custom(Arc::new(policy)),
        }
    }

    /// Apply this policy to a given [`Attempt`] to produce a [`Action`].
    ///
    /// # Note
    ///
    /// This method can be used together with `Policy::custom()` to
    /// construct one `Policy` that wraps another.
    pub fn redirect(&self, attempt: Attempt) -> Action {
        match self.inner {
            PolicyKind::Custom(ref custom) => custom(attempt),
            PolicyKind::Limit { follow, max } => {
                if !follow || max <= 0 {
                    attempt.error(RedirectNotAllowed)
                } else if attempt.previous.len() >= max as usize {
                    let count = attempt.previous.len();
                    attempt.error(TooManyRedirects { count })
                } else {
                    attempt.follow()
                }
            }
        }
    }

    pub(crate) fn check(&self, status: StatusCode, next: &Url, previous: &[Url]) -> ActionKind {
        self.redirect(Attempt {
            status,
            next,
            previous,
        })
        .inner
    }
}

impl Default for Policy {
    fn default() -> Policy {
        Policy::limited(true, 10)
    }
}

impl<'a> Attempt<'a> {
    /// Get the type of redirect.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the next URL to redirect to.
    pub fn url(&self) -> &Url {
        self.next
    }

    /// Get the list of previous URLs that have already been requested in
    /// this chain. The first entry is the initial URL of the call.
    pub fn previous(&self) -> &[Url] {
        self.previous
    }

    /// Returns an action meaning the client should follow the next URL.
    pub fn follow(self) -> Action {
        Action {
            inner: ActionKind::Follow,
        }
    }

    /// Returns an action meaning the client should not follow the next URL.
    ///
    /// The 30x response will be returned as the `Ok` result.
    pub fn stop(self) -> Action {
        Action {
            inner: ActionKind::Stop,
        }
    }

    /// Returns an action failing the redirect with an error.
    ///
    /// The `Error` will be returned for the result of the sent request; the
    /// refused 30x response stays attached to it.
    pub fn error<E: Into<BoxError>>(self, error: E) -> Action {
        Action {
            inner: ActionKind::Error(error.into()),
        }
    }
}

#[derive(Clone)]
enum PolicyKind {
    Custom(Arc<dyn Fn(Attempt) -> Action + Send + Sync + 'static>),
    Limit { follow: bool, max: i32 },
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Policy").field(&self.inner).finish()
    }
}

impl fmt::Debug for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PolicyKind::Custom(..) => f.pad("Custom"),
            PolicyKind::Limit { follow, max } => f
                .debug_struct("Limit")
                .field("follow", &follow)
                .field("max", &max)
                .finish(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum ActionKind {
    Follow,
    Stop,
    Error(BoxError),
}

/// Synthesize the policy for one call from the merged options: a custom
/// policy is used verbatim, otherwise follow-location and max-redirects
/// decide.
pub(crate) fn prepare(options: &Options) -> Policy {
    if let Some(ref policy) = options.redirect_policy {
        return policy.clone();
    }

    Policy::limited(
        options.follow_location.unwrap_or(false),
        options.max_redirects.unwrap_or(0),
    )
}

#[derive(Debug)]
struct RedirectNotAllowed;

impl fmt::Display for RedirectNotAllowed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("redirect not allowed")
    }
}

impl StdError for RedirectNotAllowed {}

#[derive(Debug)]
struct TooManyRedirects {
    count: usize,
}

impl fmt::Display for TooManyRedirects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stopped after {} redirects", self.count)
    }
}

impl StdError for TooManyRedirects {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_policy_limit() {
        let policy = Policy::default();
        let next = Url::parse("http://x.y/z").unwrap();
        let mut previous = (0..9)
            .map(|i| Url::parse(&format!("http://a.b/c/{}", i)).unwrap())
            .collect::<Vec<_>>();

        match policy.check(StatusCode::FOUND, &next, &previous) {
            ActionKind::Follow => (),
            other => panic!("unexpected {:?}", other),
        }

        previous.push(Url::parse("http://a.b.d/e/33").unwrap());

        match policy.check(StatusCode::FOUND, &next, &previous) {
            ActionKind::Error(err) if err.is::<TooManyRedirects>() => {
                assert_eq!(err.to_string(), "stopped after 10 redirects");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_redirect_policy_not_allowed() {
        let next = Url::parse("http://x.y/z").unwrap();
        let previous = vec![Url::parse("http://a.b/c").unwrap()];

        // following disabled
        let policy = Policy::limited(false, 10);
        match policy.check(StatusCode::FOUND, &next, &previous) {
            ActionKind::Error(err) if err.is::<RedirectNotAllowed>() => {
                assert_eq!(err.to_string(), "redirect not allowed");
            }
            other => panic!("unexpected {:?}", other),
        }

        // zero maximum
        let policy = Policy::limited(true, 0);
        match policy.check(StatusCode::FOUND, &next, &previous) {
            ActionKind::Error(err) if err.is::<RedirectNotAllowed>() => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_redirect_policy_custom() {
        let policy = Policy::custom(|attempt| {
            if attempt.url().host_str() == Some("foo") {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let next = Url::parse("http://bar/baz").unwrap();
        match policy.check(StatusCode::FOUND, &next, &[]) {
            ActionKind::Follow => (),
            other => panic!("unexpected {:?}", other),
        }

        let next = Url::parse("http://foo/baz").unwrap();
        match policy.check(StatusCode::FOUND, &next, &[]) {
            ActionKind::Stop => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn prepare_synthesizes_from_options() {
        let policy = prepare(&Options::new().follow_location(true).max_redirects(2));
        let next = Url::parse("http://x.y/z").unwrap();
        let previous = vec![
            Url::parse("http://a.b/0").unwrap(),
            Url::parse("http://a.b/1").unwrap(),
        ];

        match policy.check(StatusCode::FOUND, &next, &previous) {
            ActionKind::Error(err) => {
                assert_eq!(err.to_string(), "stopped after 2 redirects");
            }
            other => panic!("unexpected {:?}", other),
        }

        // a custom policy wins over the synthesized one
        let policy = prepare(
            &Options::new()
                .follow_location(false)
                .redirect_policy(Policy::custom(|attempt| attempt.follow())),
        );
        match policy.check(StatusCode::FOUND, &next, &previous) {
            ActionKind::Follow => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}
