use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use planetd::infrastructure::fetcher::{FetchError, Fetcher, MAX_BODY_BYTES};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_fetcher() -> Fetcher {
    Fetcher::relaxed("planetd-test/0.1 (+https://example.invalid)").unwrap()
}

fn empty_cache() -> planetd::domain::models::FeedCache {
    planetd::domain::models::FeedCache::default()
}

#[tokio::test]
async fn gzip_response_is_transparently_decompressed() {
    let server = MockServer::start().await;

    let body = b"hello from a gzipped feed".repeat(100);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body).unwrap();
    let compressed = encoder.finish().unwrap();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(compressed)
                .insert_header("Content-Encoding", "gzip"),
        )
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let url = format!("{}/a", server.uri());
    let response = fetcher
        .fetch(&url, &empty_cache(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.body, body);
}

#[tokio::test]
async fn body_of_exactly_the_size_limit_is_accepted() {
    let server = MockServer::start().await;
    let body = vec![b'x'; MAX_BODY_BYTES];

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let url = format!("{}/a", server.uri());
    let response = fetcher
        .fetch(&url, &empty_cache(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.body.len(), MAX_BODY_BYTES);
}

#[tokio::test]
async fn body_one_byte_over_the_size_limit_is_rejected() {
    let server = MockServer::start().await;
    let body = vec![b'x'; MAX_BODY_BYTES + 1];

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let url = format!("{}/a", server.uri());
    let err = fetcher
        .fetch(&url, &empty_cache(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::MaxSizeExceeded));
}

#[tokio::test]
async fn zero_attempt_retry_behaves_like_a_single_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let url = format!("{}/a", server.uri());
    let err = fetcher
        .fetch_with_retry(&url, &empty_cache(), 0, &CancellationToken::new())
        .await
        .unwrap_err();

    // A single failed attempt with max_attempts=0 surfaces the underlying
    // HTTP error directly rather than wrapping it in MaxRetriesExceeded,
    // matching what a bare `fetch` call would return.
    assert!(matches!(err, FetchError::HttpStatus { .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn redirect_chain_longer_than_the_limit_is_rejected() {
    let server = MockServer::start().await;
    let base = server.uri();

    for hop in 0..7 {
        Mock::given(method("GET"))
            .and(path(format!("/hop{hop}")))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{base}/hop{}", hop + 1)),
            )
            .mount(&server)
            .await;
    }

    let fetcher = test_fetcher();
    let url = format!("{base}/hop0");
    let err = fetcher
        .fetch(&url, &empty_cache(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooManyRedirects));
}

#[tokio::test]
async fn cancellation_aborts_an_in_flight_retry_wait() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "60"))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let url = format!("{}/a", server.uri());
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let started = std::time::Instant::now();
    let err = fetcher
        .fetch_with_retry(&url, &empty_cache(), 3, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}
