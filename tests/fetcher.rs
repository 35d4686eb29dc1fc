use std::time::Duration;

use cangshu::config::FetchConfig;
use cangshu::{FetchError, HttpFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> FetchConfig {
    FetchConfig {
        base_delay_ms: 1,
        max_delay_ms: 100,
        delay_increment_ms: 20,
        relax_step_ms: 5,
        error_threshold: 2,
        max_retries: 5,
        retry_base_ms: 1,
        retry_max_ms: 5,
        timeout_secs: 5,
        ..FetchConfig::default()
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{}</body></html>", body).into_bytes(),
        "text/html; charset=utf-8",
    )
}

fn long_text() -> String {
    "山风吹过竹林，少年提着灯笼走下石阶。".repeat(10)
}

#[tokio::test]
async fn transient_failures_raise_delay_then_recover() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1.html"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .with_priority(1)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1.html"))
        .respond_with(html(&long_text()))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config()).unwrap();
    let body = fetcher
        .fetch(&format!("{}/1.html", server.uri()))
        .await
        .unwrap();

    assert!(body.contains("少年提着灯笼"));
    assert!(fetcher.peak_delay() > Duration::from_millis(1));
    assert!(fetcher.current_delay() < fetcher.peak_delay());
    assert_eq!(fetcher.error_streak(), 0);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.html"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config()).unwrap();
    let err = fetcher
        .fetch(&format!("{}/missing.html", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::NotFound { .. }));
    assert!(err.is_permanent());
    assert_eq!(fetcher.error_streak(), 0);
}

#[tokio::test]
async fn forbidden_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/403.html"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config()).unwrap();
    let err = fetcher
        .fetch(&format!("{}/403.html", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 403, .. }));
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down.html"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config()).unwrap();
    let err = fetcher
        .fetch_with(&format!("{}/down.html", server.uri()), 3, true)
        .await
        .unwrap_err();

    match err {
        FetchError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(last, "HTTP 500");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fetcher.error_streak(), 3);
    assert!(fetcher.current_delay() <= Duration::from_millis(100));
}

#[tokio::test]
async fn short_body_is_requested_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/short.html"))
        .respond_with(html("x"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/short.html"))
        .respond_with(html(&long_text()))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config()).unwrap();
    let body = fetcher
        .fetch(&format!("{}/short.html", server.uri()))
        .await
        .unwrap();

    assert!(body.contains("少年提着灯笼"));
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}
