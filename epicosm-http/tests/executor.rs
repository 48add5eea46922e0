use epicosm_http::{BackoffPolicy, BearerToken, Exchange, HttpClient, HttpError, RecordingPause};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_policy() -> BackoffPolicy {
    BackoffPolicy {
        unit: Duration::from_millis(1),
        ..BackoffPolicy::default()
    }
}

fn client_for(server: &MockServer, pause: &RecordingPause) -> HttpClient {
    HttpClient::new(
        &server.uri(),
        BearerToken::new("test-token").unwrap(),
        fast_policy(),
    )
    .unwrap()
    .with_pause(Arc::new(pause.clone()))
}

#[tokio::test]
async fn rate_limits_back_off_one_five_twenty_five_one_twenty_five() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(4)
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"meta": {"result_count": 0}})))
        .expect(1)
        .mount(&server)
        .await;

    let pause = RecordingPause::new();
    let client = client_for(&server, &pause);
    let got = client.get("2/tweets/search/recent", &[]).await.unwrap();

    assert!(matches!(got, Exchange::Success(_)));
    let units: Vec<u128> = pause.delays().iter().map(|d| d.as_millis()).collect();
    assert_eq!(units, vec![1, 5, 25, 125]);
    assert!(units.iter().all(|u| *u <= 900));
}

#[tokio::test]
async fn unavailable_upstream_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let pause = RecordingPause::new();
    let got = client_for(&server, &pause).get("2/users/1/following", &[]).await.unwrap();

    assert!(matches!(got, Exchange::Success(_)));
    assert_eq!(pause.delays().len(), 2);
}

#[tokio::test]
async fn unauthorized_is_fatal_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"title": "Unauthorized", "detail": "Unauthorized"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pause = RecordingPause::new();
    let err = client_for(&server, &pause)
        .get("2/users/1/following", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::Unauthorized(_)));
    assert!(pause.delays().is_empty());
}

#[tokio::test]
async fn other_statuses_pass_body_upward() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"errors":[{"title":"Not Found"}]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let pause = RecordingPause::new();
    let got = client_for(&server, &pause).get("2/users/9/tweets", &[]).await.unwrap();

    match got {
        Exchange::Soft { status, body } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(body.contains("Not Found"));
        }
        other => panic!("expected soft outcome, got {other:?}"),
    }
    assert!(pause.delays().is_empty());
}

#[tokio::test]
async fn sends_bearer_user_agent_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/42/following"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("user-agent", "v2FullArchiveSearchPython"))
        .and(query_param("max_results", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "1"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let pause = RecordingPause::new();
    let got = client_for(&server, &pause)
        .get(
            "2/users/42/following",
            &[("max_results".to_string(), "1000".to_string())],
        )
        .await
        .unwrap();

    match got {
        Exchange::Success(body) => assert_eq!(body["data"][0]["id"], "1"),
        other => panic!("expected success, got {other:?}"),
    }
}
