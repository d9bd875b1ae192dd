mod support;

use httpclient::HttpClient;
use support::server;

#[tokio::test]
async fn file_marked_key_switches_to_multipart() {
    let file = std::env::temp_dir().join("httpclient-multipart-test.txt");
    std::fs::write(&file, b"file contents\n").unwrap();
    let path = file.to_str().unwrap().to_owned();

    let server = server::http(move |req| async move {
        let content_type = req.headers()["content-type"].to_str().unwrap().to_owned();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let boundary = content_type.split('=').nth(1).unwrap().to_owned();

        let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
        let text = std::str::from_utf8(&body).unwrap();

        assert!(text.contains(&format!("--{}\r\n", boundary)));
        assert!(
            text.contains("Content-Disposition: form-data; name=\"msg\"\r\n\r\nhi\r\n")
        );
        assert!(text.contains(
            "Content-Disposition: form-data; name=\"upload\"; \
             filename=\"httpclient-multipart-test.txt\""
        ));
        assert!(text.contains("Content-Type: text/plain"));
        assert!(text.contains("file contents\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", boundary)));

        http::Response::default()
    });

    let res = HttpClient::new()
        .post(
            &format!("http://{}/upload", server.addr()),
            &[("msg", "hi"), ("@upload", path.as_str())],
        )
        .await
        .unwrap();
    assert_eq!(res.status(), httpclient::StatusCode::OK);
}

#[tokio::test]
async fn plain_params_stay_urlencoded() {
    let server = server::http(move |req| async move {
        assert_eq!(
            req.headers()["content-type"],
            "application/x-www-form-urlencoded"
        );
        let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
        assert_eq!(&*body, b"msg=hi");
        http::Response::default()
    });

    HttpClient::new()
        .post(&format!("http://{}/form", server.addr()), &[("msg", "hi")])
        .await
        .unwrap();
}

#[tokio::test]
async fn unreadable_file_fails_before_any_io() {
    let server = server::http(move |_req| async move {
        panic!("no request should have been sent");
    });

    let err = HttpClient::new()
        .post(
            &format!("http://{}/upload", server.addr()),
            &[("@upload", "/definitely/not/here.txt")],
        )
        .await
        .unwrap_err();
    assert!(err.is_config());
}
