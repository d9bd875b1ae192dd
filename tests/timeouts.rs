mod support;

use std::time::Duration;

use httpclient::{Config, HttpClient, Options};
use support::server;

#[tokio::test]
async fn total_timeout_fails_a_slow_response() {
    let _ = env_logger::try_init();

    let server = server::http(move |_req| async {
        // delay returning the response
        tokio::time::sleep(Duration::from_millis(300)).await;
        http::Response::default()
    });

    let client = HttpClient::with_defaults(Config::from(
        Options::new().timeout_ms(100),
    ));

    let url = format!("http://{}/slow", server.addr());
    let err = client.get(&url, &[]).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.url().map(|u| u.as_str()), Some(url.as_str()));
}

#[tokio::test]
async fn one_time_timeout_override() {
    let server = server::http(move |_req| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        http::Response::default()
    });

    let client = HttpClient::new();
    let url = format!("http://{}/slow", server.addr());

    let err = client
        .with_option("timeout_ms", 100i64)
        .get(&url, &[])
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    // the override is gone; the same request now completes
    let res = client.get(&url, &[]).await.unwrap();
    assert_eq!(res.status(), httpclient::StatusCode::OK);
}

#[tokio::test]
async fn generous_timeout_lets_the_response_through() {
    let server = server::http(move |_req| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        http::Response::default()
    });

    let client = HttpClient::with_defaults(Config::from(
        Options::new().timeout(Duration::from_secs(10)),
    ));

    let url = format!("http://{}/slowish", server.addr());
    let res = client.get(&url, &[]).await.unwrap();
    assert_eq!(res.status(), httpclient::StatusCode::OK);
}

#[tokio::test]
async fn total_timeout_spans_redirect_hops() {
    let server = server::http(move |req| async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        match req.uri().path() {
            "/hop/0" => http::Response::default(),
            path => {
                let hops: u32 = path.trim_start_matches("/hop/").parse().unwrap();
                http::Response::builder()
                    .status(302)
                    .header("location", format!("/hop/{}", hops - 1))
                    .body(hyper::Body::default())
                    .unwrap()
            }
        }
    });

    let client = HttpClient::new();
    let url = format!("http://{}/hop/5", server.addr());

    // each hop is fast enough on its own; the chain is not
    let err = client
        .with_option("timeout_ms", 200i64)
        .get(&url, &[])
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}
