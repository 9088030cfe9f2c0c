//! GovernedClient behaviour against a mock relay.

use std::time::Duration;

use bytes::Bytes;
use mediarelay_governor::mirror::MAX_RESET_SECS;
use mediarelay_governor::{GovernedClient, Governor, GovernorError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> GovernedClient {
    GovernedClient::new(Governor::default()).unwrap()
}

#[tokio::test]
async fn test_second_get_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/image-series/s1/cover"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cover-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/assets/image-series/s1/cover", server.uri());

    let first = client.fetch(&url).await.unwrap();
    let second = client.fetch(&url).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.body, second.body);
    assert_eq!(first.body, Bytes::from_static(b"cover-bytes"));
}

#[tokio::test]
async fn test_failure_suppresses_reissue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/image-series/s1/page/2/stream"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/assets/image-series/s1/page/2/stream", server.uri());

    assert_eq!(
        client.fetch(&url).await,
        Err(GovernorError::Status { status: 503 })
    );
    assert!(client.governor().is_recently_failed(&url));
    assert!(matches!(
        client.fetch(&url).await,
        Err(GovernorError::RecentlyFailed { .. })
    ));
}

#[tokio::test]
async fn test_429_populates_mirror_and_blocks_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/video/v1/stream"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Rate-Limit-Reset", "120")
                .set_body_json(serde_json::json!({
                    "success": false,
                    "message": "Bandwidth limit reached",
                    "timeLimit": 120
                })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/assets/video/v2/stream"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client();
    let result = client
        .fetch(&format!("{}/assets/video/v1/stream", server.uri()))
        .await;
    assert_eq!(
        result,
        Err(GovernorError::RateLimited {
            remaining_secs: 120
        })
    );

    let status = client.governor().is_rate_limited();
    assert!(status.limited);
    assert!(status.remaining_secs <= 120 && status.remaining_secs >= 119);

    let blocked = client
        .fetch(&format!("{}/assets/video/v2/stream", server.uri()))
        .await;
    assert!(matches!(blocked, Err(GovernorError::RateLimited { .. })));
}

#[tokio::test]
async fn test_429_body_time_limit_used_without_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/image-series/s1/pages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "success": false,
            "message": "Bandwidth limit reached",
            "timeLimit": 90
        })))
        .mount(&server)
        .await;

    let client = client();
    let result = client
        .fetch(&format!("{}/assets/image-series/s1/pages", server.uri()))
        .await;
    assert_eq!(
        result,
        Err(GovernorError::RateLimited { remaining_secs: 90 })
    );
    assert!(client.governor().is_rate_limited().limited);
}

#[tokio::test]
async fn test_oversized_reset_hint_is_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/video/v1/stream"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Rate-Limit-Reset", "18446744073709551615"),
        )
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/assets/video/v1/stream", server.uri());
    let (a, b) = tokio::join!(client.fetch(&url), client.fetch(&url));
    for result in [a, b] {
        assert_eq!(
            result,
            Err(GovernorError::RateLimited {
                remaining_secs: MAX_RESET_SECS
            })
        );
    }
    assert!(client.governor().is_rate_limited().remaining_secs <= MAX_RESET_SECS);
}

#[tokio::test]
async fn test_placeholder_redirect_teaches_mirror_and_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/image-series/s1/page/1/stream"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/placeholder.jpg")
                .insert_header("X-Rate-Limit-Reset", "60"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/placeholder.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"placeholder".to_vec()))
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/assets/image-series/s1/page/1/stream", server.uri());
    let fetched = client.fetch(&url).await.unwrap();

    assert!(fetched.fallback);
    assert_eq!(fetched.body, Bytes::from_static(b"placeholder"));
    assert!(client.governor().get(&url).is_none());
    assert!(!client.governor().is_recently_failed(&url));
    assert!(client.governor().is_rate_limited().limited);
}

#[tokio::test]
async fn test_concurrent_fetches_of_same_url_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/image-series/s1/cover"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"shared".to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let url = format!("{}/assets/image-series/s1/cover", server.uri());

    let (a, b, c) = tokio::join!(client.fetch(&url), client.fetch(&url), client.fetch(&url));
    assert_eq!(a.unwrap().body, Bytes::from_static(b"shared"));
    assert_eq!(b.unwrap().body, Bytes::from_static(b"shared"));
    assert_eq!(c.unwrap().body, Bytes::from_static(b"shared"));
}

#[tokio::test]
async fn test_provider_fetches_never_exceed_two_in_flight() {
    let server = MockServer::start().await;
    for i in 0..6 {
        Mock::given(method("GET"))
            .and(path(format!("/assets/image-series/s1/page/{i}/stream")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![i as u8; 16])
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client();
    let urls: Vec<String> = (0..6)
        .map(|i| format!("{}/assets/image-series/s1/page/{i}/stream", server.uri()))
        .collect();

    let results = futures::future::join_all(urls.iter().map(|u| client.fetch(u))).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let stats = client.governor().stats().queue;
    assert!(stats.peak_in_flight <= 2);
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_non_provider_urls_bypass_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/image-series/s1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{}".to_vec()))
        .mount(&server)
        .await;

    let client = client();
    client
        .fetch(&format!("{}/assets/image-series/s1/pages", server.uri()))
        .await
        .unwrap();

    assert_eq!(client.governor().stats().queue.completed, 0);
}
