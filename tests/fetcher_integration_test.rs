use std::time::Duration;
use weather_etl::error::FetchError;
use weather_etl::fetcher::Fetcher;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn current_payload(temp_c: f64) -> serde_json::Value {
    serde_json::json!({
        "location": { "name": "Curitiba", "region": "Parana", "country": "Brazil" },
        "current": {
            "temp_c": temp_c,
            "wind_kph": 9.0,
            "condition": { "text": "Sunny", "code": 1000 },
            "precip_mm": 0.0,
            "humidity": 55,
            "feelslike_c": temp_c,
            "pressure_mb": 1015.0,
            "vis_km": 10.0,
            "is_day": 1
        }
    })
}

fn fetcher_for(server: &MockServer, timeout: Duration) -> Fetcher {
    Fetcher::new(&server.uri(), "test-key", timeout).expect("Failed to create fetcher")
}

/// Test request shape: key, city and air-quality flag go in the query string
#[tokio::test]
async fn test_fetch_sends_expected_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/current.json"))
        .and(query_param("key", "test-key"))
        .and(query_param("q", "Rio de Janeiro"))
        .and(query_param("aqi", "yes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_payload(30.2)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server, Duration::from_secs(5));
    let payload = fetcher
        .fetch("Rio de Janeiro")
        .await
        .expect("fetch should succeed");

    assert_eq!(payload["current"]["temp_c"], 30.2);
    assert_eq!(payload["current"]["condition"]["text"], "Sunny");
}

/// Test that a 5xx is a fetch failure, not a panic
#[tokio::test]
async fn test_fetch_server_error_is_status_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch("Curitiba").await.unwrap_err();

    match err {
        FetchError::Status { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "Service Unavailable");
        }
        e => panic!("Expected Status error, got: {:?}", e),
    }
}

/// Test that the provider's own error message is surfaced for unknown cities
#[tokio::test]
async fn test_fetch_unknown_city_uses_provider_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "code": 1006, "message": "No matching location found." }
        })))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch("Atlantis").await.unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 400, .. }));
    assert!(err.to_string().contains("No matching location found."));
}

/// Test that a 200 with a non-JSON body is a fetch failure
#[tokio::test]
async fn test_fetch_malformed_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch("Curitiba").await.unwrap_err();

    assert!(matches!(err, FetchError::Malformed(_)), "got {:?}", err);
}

/// Test that a slow provider is cut off by the request timeout
#[tokio::test]
async fn test_fetch_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(current_payload(20.0))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server, Duration::from_millis(300));
    let err = fetcher.fetch("Curitiba").await.unwrap_err();

    assert!(matches!(err, FetchError::Timeout(_)), "got {:?}", err);
    assert!(err.to_string().contains("timed out"));
}

/// Test that an unreachable provider is reported, not raised
#[tokio::test]
async fn test_fetch_connection_refused() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();
    drop(mock_server);

    let fetcher = Fetcher::new(&uri, "test-key", Duration::from_secs(2))
        .expect("Failed to create fetcher");
    let err = fetcher.fetch("Curitiba").await.unwrap_err();

    assert!(
        matches!(err, FetchError::Connect(_) | FetchError::Transport(_)),
        "got {:?}",
        err
    );
}

/// Test that there is exactly one attempt per call
#[tokio::test]
async fn test_fetch_does_not_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_for(&mock_server, Duration::from_secs(5));
    tokio_test::assert_err!(fetcher.fetch("Curitiba").await);
}
