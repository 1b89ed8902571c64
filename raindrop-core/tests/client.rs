use raindrop_core::{ApiErrorClass, NewRaindrop, RaindropClient, RaindropError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn list_raindrops_sends_bearer_and_paging() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/raindrops/42"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("perpage", "50"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "count": 152,
            "items": [
                { "_id": 1001, "link": "file:///docs/a.pdf", "title": "a.pdf" },
                { "_id": 1002, "link": "file:///docs/b.pdf" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RaindropClient::with_base_url(&server.uri(), "test-token").unwrap();
    let page = client.list_raindrops(42, 3, 50).await.unwrap();

    assert_eq!(page.count, 152);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].id, 1001);
    assert_eq!(page.items[0].title.as_deref(), Some("a.pdf"));
    assert_eq!(page.items[1].link, "file:///docs/b.pdf");
    assert_eq!(page.items[1].title, None);
}

#[tokio::test]
async fn list_raindrops_accepts_negative_system_collections() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/raindrops/-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "count": 0,
            "items": []
        })))
        .mount(&server)
        .await;

    let client = RaindropClient::with_base_url(&server.uri(), "test-token").unwrap();
    let page = client.list_raindrops(-1, 0, 50).await.unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.count, 0);
}

#[tokio::test]
async fn create_raindrops_posts_all_items_in_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/raindrops"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({
            "items": [
                {
                    "link": "file:///docs/a.pdf",
                    "title": "a.pdf",
                    "tags": ["docs"],
                    "collection": { "$ref": "collections", "$id": 42 },
                    "pleaseParse": {}
                },
                {
                    "link": "file:///docs/b.pdf",
                    "title": "b.pdf",
                    "pleaseParse": {}
                }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "items": [
                { "_id": 7, "link": "file:///docs/a.pdf" },
                { "_id": 8, "link": "file:///docs/b.pdf" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RaindropClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = vec![
        NewRaindrop::new("file:///docs/a.pdf")
            .with_title("a.pdf")
            .with_tags(["docs"])
            .with_collection(42),
        NewRaindrop::new("file:///docs/b.pdf").with_title("b.pdf"),
    ];
    let created = client.create_raindrops(&items).await.unwrap();

    let ids: Vec<u64> = created.items.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![7, 8]);
}

#[tokio::test]
async fn find_collection_prefers_root_collections() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "items": [
                { "_id": 10, "title": "Inbox", "count": 3 },
                { "_id": 11, "title": "Documents", "count": 12 }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/collections/childrens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "items": [{ "_id": 99, "title": "Documents" }]
        })))
        .expect(0)
        .mount(&server)
        .await;

    let client = RaindropClient::with_base_url(&server.uri(), "test-token").unwrap();
    let found = client.find_collection("Documents").await.unwrap().unwrap();

    assert_eq!(found.id, 11);
    assert_eq!(found.count, 12);
}

#[tokio::test]
async fn find_collection_falls_back_to_children() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "items": [{ "_id": 10, "title": "Inbox" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/collections/childrens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "items": [{ "_id": 55, "title": "Papers" }]
        })))
        .mount(&server)
        .await;

    let client = RaindropClient::with_base_url(&server.uri(), "test-token").unwrap();

    assert_eq!(
        client.find_collection("Papers").await.unwrap().map(|c| c.id),
        Some(55)
    );
    assert!(client.find_collection("Missing").await.unwrap().is_none());
}

#[tokio::test]
async fn api_errors_carry_status_and_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/raindrops/42"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "12")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let client = RaindropClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client.list_raindrops(42, 0, 50).await.unwrap_err();

    assert!(matches!(
        &err,
        RaindropError::Api { status, body, .. }
            if status.as_u16() == 429 && body == "slow down"
    ));
    assert_eq!(err.classification(), Some(ApiErrorClass::RateLimit));
    assert!(err.is_retryable());
    assert_eq!(err.retry_after_secs(), Some(12));
}

#[tokio::test]
async fn unauthorized_is_not_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/collections"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let client = RaindropClient::with_base_url(&server.uri(), "wrong").unwrap();
    let err = client.list_collections().await.unwrap_err();

    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
    assert!(!err.is_retryable());
    assert_eq!(err.retry_after_secs(), None);
}
