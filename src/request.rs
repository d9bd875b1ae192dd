//! Request assembly: query parameters, headers and bodies.

use std::path::Path;

use http::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, RANGE, REFERER, USER_AGENT,
};
use http::Method;
use url::Url;

use crate::body::Body;
use crate::options::Options;
use crate::util;
use crate::Error;

/// Encode parameter pairs as an `application/x-www-form-urlencoded`
/// string.
pub(crate) fn params_to_string(params: &[(&str, &str)]) -> crate::Result<String> {
    serde_urlencoded::to_string(params).map_err(Error::config)
}

/// Add params to a url string, joining with `?` or `&` depending on
/// whether the url already has a query string.
pub(crate) fn add_params(url: &str, params: &[(&str, &str)]) -> crate::Result<String> {
    if params.is_empty() {
        return Ok(url.to_owned());
    }

    let mut url = url.to_owned();
    if !url.contains('?') {
        url.push('?');
    }

    if !(url.ends_with('?') || url.ends_with('&')) {
        url.push('&');
    }

    url.push_str(&params_to_string(params)?);
    Ok(url)
}

/// Does any of the params reference a form file?
///
/// A key starting with `@` marks its value as a local file path to upload,
/// which switches the request to multipart encoding.
pub(crate) fn has_file_param(params: &[(&str, &str)]) -> bool {
    params.iter().any(|(k, _)| k.starts_with('@'))
}

/// A url-encoded form body with its content type.
pub(crate) fn form_body(params: &[(&str, &str)]) -> crate::Result<(HeaderValue, Body)> {
    let body = params_to_string(params)?;
    Ok((
        HeaderValue::from_static("application/x-www-form-urlencoded"),
        Body::from(body),
    ))
}

// xorshift64 over a per-thread state seeded from RandomState; good enough
// for boundary uniqueness without pulling in an rng crate
fn rand64() -> u64 {
    use std::cell::Cell;
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    fn seed() -> u64 {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u64(0xb0df);
        // xorshift state must never be zero
        hasher.finish() | 1
    }

    thread_local! {
        static STATE: Cell<u64> = Cell::new(seed());
    }

    STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}

fn gen_boundary() -> String {
    format!(
        "{:016x}-{:016x}-{:016x}-{:016x}",
        rand64(),
        rand64(),
        rand64(),
        rand64()
    )
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A `multipart/form-data` body with its content type.
///
/// `@`-prefixed keys reference local files: the file is read here, before
/// any network I/O, and an unreadable path is a configuration error. Other
/// keys become plain form fields.
pub(crate) async fn multipart_body(params: &[(&str, &str)]) -> crate::Result<(HeaderValue, Body)> {
    let boundary = gen_boundary();
    let mut buf: Vec<u8> = Vec::new();

    for (k, v) in params {
        buf.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());

        match k.strip_prefix('@') {
            Some(name) => {
                let path = Path::new(v);
                let contents = tokio::fs::read(path).await.map_err(|e| {
                    Error::config(format!("cannot read form file {}: {}", v, e))
                })?;
                let filename = path
                    .file_name()
                    .and_then(|f| f.to_str())
                    .unwrap_or(v);
                let mime = mime_guess::from_path(path).first_or_octet_stream();

                buf.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        escape_quotes(name),
                        escape_quotes(filename)
                    )
                    .as_bytes(),
                );
                buf.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
                buf.extend_from_slice(&contents);
                buf.extend_from_slice(b"\r\n");
            }
            None => {
                buf.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        escape_quotes(k)
                    )
                    .as_bytes(),
                );
                buf.extend_from_slice(v.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
        }
    }

    buf.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    let content_type =
        HeaderValue::from_str(&format!("multipart/form-data; boundary={}", boundary))
            .map_err(Error::config)?;

    Ok((content_type, Body::from(buf)))
}

/// A JSON body with its content type.
pub(crate) fn json_body<T: serde::Serialize>(data: &T) -> crate::Result<(HeaderValue, Body)> {
    let body = serde_json::to_vec(data).map_err(Error::config)?;
    Ok((
        HeaderValue::from_static("application/json"),
        Body::from(body),
    ))
}

/// Assemble the header set of a request.
///
/// Option-derived headers (referer, user agent) go in first, then the
/// merged client/one-time tier, then the caller's explicit headers, so
/// later tiers win name-by-name. `Accept-Encoding: gzip` is added when the
/// caller supplied neither it nor a `Range` header.
pub(crate) fn prepare_headers(
    options: &Options,
    base: HeaderMap,
    call: Option<HeaderMap>,
) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if let Some(ref referer) = options.referer {
        headers.insert(REFERER, HeaderValue::from_str(referer).map_err(Error::config)?);
    }

    if let Some(ref user_agent) = options.user_agent {
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(Error::config)?,
        );
    }

    util::replace_headers(&mut headers, base);
    if let Some(call) = call {
        util::replace_headers(&mut headers, call);
    }

    if !headers.contains_key(ACCEPT_ENCODING) && !headers.contains_key(RANGE) {
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    }

    Ok(headers)
}

/// Attach a content type unless the caller already set one, so an explicit
/// `Content-Type` header (e.g. a json charset variant) wins over the
/// body-derived one.
pub(crate) fn default_content_type(headers: &mut HeaderMap, value: HeaderValue) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, value);
    }
}

/// Render the outgoing request for the debug option.
pub(crate) fn dump(method: &Method, url: &Url, headers: &HeaderMap) -> String {
    let mut out = format!("{} {} HTTP/1.1\r\n", method, url);
    for (name, value) in headers {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_params_joins_correctly() {
        let params = &[("a", "b")][..];

        assert_eq!(add_params("http://x/", &[]).unwrap(), "http://x/");
        assert_eq!(add_params("http://x/", params).unwrap(), "http://x/?a=b");
        assert_eq!(
            add_params("http://x/?c=d", params).unwrap(),
            "http://x/?c=d&a=b"
        );
        assert_eq!(add_params("http://x/?", params).unwrap(), "http://x/?a=b");
        assert_eq!(
            add_params("http://x/?c=d&", params).unwrap(),
            "http://x/?c=d&a=b"
        );
    }

    #[test]
    fn params_are_url_encoded() {
        let encoded = params_to_string(&[("c", "a=b&c d")]).unwrap();
        assert_eq!(encoded, "c=a%3Db%26c+d");
    }

    #[test]
    fn boundaries_differ_between_requests() {
        assert_ne!(gen_boundary(), gen_boundary());
    }

    #[test]
    fn file_params_are_detected() {
        assert!(has_file_param(&[("msg", "hi"), ("@file", "/tmp/x.txt")]));
        assert!(!has_file_param(&[("msg", "hi")]));
    }

    #[test]
    fn caller_headers_win_over_option_derived() {
        let options = Options::new().user_agent("from-options");
        let mut call = HeaderMap::new();
        call.insert(USER_AGENT, HeaderValue::from_static("from-caller"));

        let headers = prepare_headers(&options, HeaderMap::new(), Some(call)).unwrap();
        assert_eq!(headers.get(USER_AGENT).unwrap(), "from-caller");
    }

    #[test]
    fn accept_encoding_respects_range() {
        let headers = prepare_headers(&Options::new(), HeaderMap::new(), None).unwrap();
        assert_eq!(headers.get(ACCEPT_ENCODING).unwrap(), "gzip");

        let mut call = HeaderMap::new();
        call.insert(RANGE, HeaderValue::from_static("bytes=0-5"));
        let headers = prepare_headers(&Options::new(), HeaderMap::new(), Some(call)).unwrap();
        assert!(headers.get(ACCEPT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn multipart_fields_and_missing_file() {
        let (content_type, body) = multipart_body(&[("msg", "hi")]).await.unwrap();
        let content_type = content_type.to_str().unwrap().to_owned();
        assert!(content_type.starts_with("multipart/form-data; boundary="));

        let boundary = content_type.split('=').nth(1).unwrap().to_owned();
        let bytes = body.as_reusable().unwrap().clone();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains(&format!("--{}\r\n", boundary)));
        assert!(text.contains("Content-Disposition: form-data; name=\"msg\"\r\n\r\nhi\r\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", boundary)));

        let err = multipart_body(&[("@file", "/definitely/not/here.txt")])
            .await
            .unwrap_err();
        assert!(err.is_config());
    }
}
