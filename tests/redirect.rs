mod support;

use std::sync::{Arc, Mutex};

use httpclient::{redirect, Config, HttpClient, Options};
use support::server;

#[tokio::test]
async fn redirect_301_and_302_and_303_changes_post_to_get() {
    let codes = [301u16, 302, 303];

    for &code in &codes {
        let redirect = server::http(move |req| async move {
            if req.method() == "POST" {
                assert_eq!(req.uri(), &*format!("/{}", code));
                http::Response::builder()
                    .status(code)
                    .header("location", "/dst")
                    .header("server", "test-redirect")
                    .body(hyper::Body::default())
                    .unwrap()
            } else {
                assert_eq!(req.method(), "GET");
                assert_eq!(req.uri(), "/dst");

                http::Response::builder()
                    .header("server", "test-dst")
                    .body(hyper::Body::default())
                    .unwrap()
            }
        });

        let url = format!("http://{}/{}", redirect.addr(), code);
        let dst = format!("http://{}/{}", redirect.addr(), "dst");
        let res = HttpClient::new()
            .post(&url, &[("key", "value")])
            .await
            .unwrap();
        assert_eq!(res.url().as_str(), dst.as_str());
        assert_eq!(res.status(), httpclient::StatusCode::OK);
        assert_eq!(res.headers().get("server").unwrap(), &"test-dst");
    }
}

#[tokio::test]
async fn redirect_307_and_308_tries_to_post_again() {
    let codes = [307u16, 308];

    for &code in &codes {
        let redirect = server::http(move |req| async move {
            assert_eq!(req.method(), "POST");
            if req.uri() == &*format!("/{}", code) {
                http::Response::builder()
                    .status(code)
                    .header("location", "/dst")
                    .body(hyper::Body::default())
                    .unwrap()
            } else {
                assert_eq!(req.uri(), "/dst");
                let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
                assert_eq!(&*body, b"key=value");

                http::Response::builder()
                    .header("server", "test-dst")
                    .body(hyper::Body::default())
                    .unwrap()
            }
        });

        let url = format!("http://{}/{}", redirect.addr(), code);
        let res = HttpClient::new()
            .post(&url, &[("key", "value")])
            .await
            .unwrap();
        assert_eq!(res.status(), httpclient::StatusCode::OK);
        assert_eq!(res.headers().get("server").unwrap(), &"test-dst");
    }
}

#[tokio::test]
async fn user_agent_carries_over_every_hop() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();

    let server = server::http(move |req| {
        let record = record.clone();
        async move {
            record.lock().unwrap().push(
                req.headers()["user-agent"]
                    .to_str()
                    .unwrap()
                    .to_owned(),
            );

            let path = req.uri().path().to_owned();
            let hops: u32 = path.trim_start_matches("/redirect/").parse().unwrap();
            if hops == 0 {
                http::Response::default()
            } else {
                http::Response::builder()
                    .status(302)
                    .header("location", format!("/redirect/{}", hops - 1))
                    .body(hyper::Body::default())
                    .unwrap()
            }
        }
    });

    let client = HttpClient::with_defaults(Config::from(
        Options::new().user_agent("test redirect"),
    ));

    let res = client
        .get(&format!("http://{}/redirect/3", server.addr()), &[])
        .await
        .unwrap();
    assert_eq!(res.status(), httpclient::StatusCode::OK);
    assert_eq!(
        res.url().as_str(),
        &format!("http://{}/redirect/0", server.addr())
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|ua| ua == "test redirect"));
}

#[tokio::test]
async fn auto_referer_is_set_on_the_next_hop() {
    let server = server::http(move |req| async move {
        match req.uri().path() {
            "/start" => http::Response::builder()
                .status(302)
                .header("location", "/next")
                .body(hyper::Body::default())
                .unwrap(),
            "/next" => {
                let referer = req.headers()["referer"].to_str().unwrap().to_owned();
                assert!(referer.ends_with("/start"));
                http::Response::default()
            }
            other => panic!("unexpected path {}", other),
        }
    });

    HttpClient::new()
        .get(&format!("http://{}/start", server.addr()), &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn max_redirects_stops_the_chain() {
    let server = server::http(move |req| async move {
        let path = req.uri().path().to_owned();
        let hops: u32 = path.trim_start_matches("/relative-redirect/").parse().unwrap();
        if hops == 0 {
            http::Response::default()
        } else {
            http::Response::builder()
                .status(302)
                .header("location", format!("/relative-redirect/{}", hops - 1))
                .body(hyper::Body::default())
                .unwrap()
        }
    });

    let client = HttpClient::new();
    let err = client
        .with_option("maxredirs", 2i64)
        .get(&format!("http://{}/relative-redirect/3", server.addr()), &[])
        .await
        .unwrap_err();

    assert!(err.is_redirect());
    assert!(err.to_string().contains("stopped after 2 redirects"));

    // the refused hop stays inspectable
    let res = err.response().unwrap();
    assert_eq!(res.status(), httpclient::StatusCode::FOUND);
    assert_eq!(
        res.headers().get("location").unwrap(),
        &"/relative-redirect/1"
    );
}

#[tokio::test]
async fn disabled_follow_refuses_the_first_redirect() {
    let server = server::http(move |_req| async move {
        http::Response::builder()
            .status(302)
            .header("location", "/next")
            .body(hyper::Body::default())
            .unwrap()
    });

    let client = HttpClient::new();
    let err = client
        .with_option("followlocation", false)
        .get(&format!("http://{}/start", server.addr()), &[])
        .await
        .unwrap_err();

    assert!(err.is_redirect());
    assert!(err.to_string().contains("redirect not allowed"));

    let res = err.into_response().unwrap();
    assert_eq!(res.status(), httpclient::StatusCode::FOUND);
    assert_eq!(res.headers().get("location").unwrap(), &"/next");
}

#[tokio::test]
async fn custom_policy_can_stop_with_the_response() {
    let server = server::http(move |req| async move {
        match req.uri().path() {
            "/stop-here" => http::Response::builder()
                .status(302)
                .header("location", "/gone")
                .body(hyper::Body::default())
                .unwrap(),
            other => panic!("should not have been followed: {}", other),
        }
    });

    let policy = redirect::Policy::custom(|attempt| {
        if attempt.url().path() == "/gone" {
            attempt.stop()
        } else {
            attempt.follow()
        }
    });

    let client = HttpClient::new();
    let res = client
        .with_options(Options::new().redirect_policy(policy))
        .get(&format!("http://{}/stop-here", server.addr()), &[])
        .await
        .unwrap();

    // stop means the 30x response is the Ok result
    assert_eq!(res.status(), httpclient::StatusCode::FOUND);
}

#[tokio::test]
async fn custom_policy_errors_carry_the_response() {
    let server = server::http(move |_req| async move {
        http::Response::builder()
            .status(302)
            .header("location", "/loop")
            .body(hyper::Body::default())
            .unwrap()
    });

    let policy = redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > 2 {
            attempt.error("should stop here")
        } else {
            attempt.follow()
        }
    });

    let client = HttpClient::with_defaults(Config::from(
        Options::new().redirect_policy(policy),
    ));
    let err = client
        .get(&format!("http://{}/loop", server.addr()), &[])
        .await
        .unwrap_err();

    assert!(err.is_redirect());
    assert!(err.to_string().contains("should stop here"));
    assert!(err.response().is_some());
}
