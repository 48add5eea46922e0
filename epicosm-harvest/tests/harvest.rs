use epicosm_harvest::{
    load_seeds, refresh_seeds, Collection, DedupStore, FollowGraphHarvester, HarvestError,
    PseudofeedAggregator, SeedFeed, SeedUser, TimelineHarvester,
};
use epicosm_http::{BackoffPolicy, BearerToken, HttpClient, RecordingPause};
use epicosm_social::twitter::TwitterApi;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> TwitterApi {
    let http = HttpClient::new(
        &server.uri(),
        BearerToken::new("test-token").unwrap(),
        BackoffPolicy {
            unit: Duration::from_millis(1),
            ..BackoffPolicy::default()
        },
    )
    .unwrap()
    .with_pause(Arc::new(RecordingPause::new()));
    TwitterApi::new(http)
}

async fn memory_store() -> DedupStore {
    DedupStore::connect("sqlite::memory:").await.unwrap()
}

fn seed(id: u64) -> SeedUser {
    SeedUser { id, username: None }
}

async fn mount_two_page_follows(server: &MockServer, seed_id: u64) {
    let route = format!("/2/users/{seed_id}/following");
    Mock::given(method("GET"))
        .and(path(route.as_str()))
        .and(query_param_is_missing("pagination_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "11", "username": "a"}, {"id": "12", "username": "b"}],
            "meta": {"result_count": 2, "next_token": "p2"}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route.as_str()))
        .and(query_param("pagination_token", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "13", "username": "c"}],
            "meta": {"result_count": 1}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn harvesting_twice_leaves_edge_count_unchanged() {
    let server = MockServer::start().await;
    mount_two_page_follows(&server, 100).await;
    let api = api_for(&server);
    let store = memory_store().await;
    let harvester = FollowGraphHarvester::new(&api, &store, 1000);

    let first = harvester.harvest_seed(&seed(100)).await.unwrap();
    let second = harvester.harvest_seed(&seed(100)).await.unwrap();

    assert_eq!((first.pages, first.inserted, first.edges), (2, 3, 3));
    assert_eq!((second.inserted, second.duplicates, second.edges), (0, 3, 3));
    assert_eq!(store.count_follows_for(100).await.unwrap(), 3);

    let docs = store.documents(Collection::Follows).await.unwrap();
    assert!(docs.iter().all(|d| d.doc["follower_id"] == 100));
}

#[tokio::test]
async fn unauthorized_stops_before_the_next_seed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/1/following"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"title": "Unauthorized"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/users/2/following"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "5"}]})))
        .expect(0)
        .mount(&server)
        .await;

    let api = api_for(&server);
    let store = memory_store().await;
    let err = FollowGraphHarvester::new(&api, &store, 1000)
        .harvest_all(&[seed(1), seed(2)])
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::Unauthorized(_)));
    assert_eq!(store.count(Collection::Follows).await.unwrap(), 0);
}

#[tokio::test]
async fn soft_failure_on_one_seed_does_not_block_the_next() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/1/following"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"title": "Authorization Error", "detail": "protected"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_two_page_follows(&server, 2).await;

    let api = api_for(&server);
    let store = memory_store().await;
    let summary = FollowGraphHarvester::new(&api, &store, 1000)
        .harvest_all(&[seed(1), seed(2)])
        .await
        .unwrap();

    assert_eq!(summary.seeds_done, 2);
    assert_eq!(summary.total_edges, 3);
    assert_eq!(summary.distinct_followers, 1);
}

#[tokio::test]
async fn pseudofeed_concatenates_in_return_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("query", "from:201"))
        .and(query_param("max_results", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "1", "author_id": "201", "text": "hello "},
                {"id": "2", "author_id": "201", "text": "world"}
            ],
            "meta": {"result_count": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("query", "from:202"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"meta": {"result_count": 0}})))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server);
    let store = memory_store().await;
    store
        .insert_follows(7, &[json!({"id": "201"}), json!({"id": "202"})])
        .await;

    let outcome = PseudofeedAggregator::new(&api, &store, 10, 7)
        .aggregate_seed(&seed(7))
        .await
        .unwrap();

    let feeds = store.pseudofeeds_for(7).await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].text, "hello world");
    assert_eq!(feeds[0].user, 7);
    match outcome {
        SeedFeed::Written(stats) => {
            assert_eq!(stats.accounts, 2);
            assert_eq!(stats.contributing, 1);
            assert_eq!(stats.posts, 2);
        }
        SeedFeed::Skipped => panic!("seed with edges was skipped"),
    }
}

#[tokio::test]
async fn pseudofeed_written_even_when_every_account_is_silent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let store = memory_store().await;
    store.insert_follows(8, &[json!({"id": "300"})]).await;

    PseudofeedAggregator::new(&api, &store, 10, 7)
        .aggregate_seed(&seed(8))
        .await
        .unwrap();

    let feeds = store.pseudofeeds_for(8).await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert!(feeds[0].text.is_empty());
}

#[tokio::test]
async fn seed_without_edges_is_skipped_without_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(0)
        .mount(&server)
        .await;

    let api = api_for(&server);
    let store = memory_store().await;
    let summary = PseudofeedAggregator::new(&api, &store, 10, 7)
        .aggregate_all(&[seed(9)])
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 0);
    assert_eq!(store.count(Collection::Pseudofeed).await.unwrap(), 0);
}

#[tokio::test]
async fn timelines_land_in_posts_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/4/tweets"))
        .and(query_param("max_results", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "90", "author_id": "4", "created_at": "2024-05-01T10:00:00.000Z", "text": "a"},
                {"id": "91", "author_id": "4", "created_at": "2024-05-01T11:00:00.000Z", "text": "b"}
            ],
            "meta": {"result_count": 2}
        })))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let store = memory_store().await;
    let harvester = TimelineHarvester::new(&api, &store, 100);
    harvester.harvest_all(&[seed(4)]).await.unwrap();
    let again = harvester.harvest_all(&[seed(4)]).await.unwrap();

    assert_eq!(again.inserted, 0);
    assert_eq!(again.duplicates, 2);
    assert_eq!(store.count(Collection::Posts).await.unwrap(), 2);
}

#[tokio::test]
async fn refresh_resolves_handles_and_rewrites_seed_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .and(query_param("usernames", "alice,bob"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "101", "username": "alice"},
                {"id": "102", "username": "bob"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let user_list = dir.path().join("user_list");
    let seeds_file = dir.path().join("user_details.json");
    std::fs::write(&user_list, "@alice\nbob\n\n").unwrap();

    let api = api_for(&server);
    let seeds = refresh_seeds(&api, &user_list, &seeds_file).await.unwrap();

    assert_eq!(seeds.iter().map(|s| s.id).collect::<Vec<_>>(), vec![101, 102]);
    assert_eq!(load_seeds(&seeds_file).unwrap(), seeds);
}

#[tokio::test]
async fn failed_refresh_keeps_the_previous_seed_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"title": "Invalid Request"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let user_list = dir.path().join("user_list");
    let seeds_file = dir.path().join("user_details.json");
    std::fs::write(&user_list, "alice\nbob\n").unwrap();
    std::fs::write(
        &seeds_file,
        r#"[{"id": 101, "username": "alice"}, {"id": "102", "username": "bob"}]"#,
    )
    .unwrap();

    let api = api_for(&server);
    let err = refresh_seeds(&api, &user_list, &seeds_file).await.unwrap_err();

    assert!(matches!(err, HarvestError::Seeds(_)));
    assert!(!err.is_fatal());
    let kept = load_seeds(&seeds_file).unwrap();
    assert_eq!(kept.iter().map(|s| s.id).collect::<Vec<_>>(), vec![101, 102]);
}
