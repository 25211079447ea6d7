//! Integration tests for the authenticated transport using wiremock
//!
//! These tests mock the PartsDesk backend to verify authorization headers,
//! expiry refresh, session-ending 401s, retries, login and page loading.

use partsdesk_client::{
    ApiClient, ApiConfig, ApiRequest, ClientError, Credentials, HttpClientConfig, PageSource,
    RouteFetcher,
};
use partsdesk_core::models::SparePart;
use partsdesk_core::{Session, SessionStore};
use partsdesk_session::MemorySessionStore;
use std::sync::Arc;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path, query_param},
};

const FAR_EXPIRY: &str = "2099-01-01T00:00:00.000Z";

fn config_for(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: server.uri(),
        http: HttpClientConfig {
            max_retries: 1,
            ..HttpClientConfig::default()
        },
        ..ApiConfig::default()
    }
}

fn healthy_store() -> Arc<MemorySessionStore> {
    Arc::new(MemorySessionStore::with_session(
        Session::new("tok-1").with_expiry(FAR_EXPIRY),
    ))
}

#[tokio::test]
async fn test_authenticated_request_carries_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"_id": {"$oid": "65a1"}, "code": "R-1", "stock": "3"}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(config_for(&mock_server), healthy_store()).unwrap();
    let page = client
        .get_page::<SparePart>(ApiRequest::get("/repuestos"))
        .await
        .unwrap();

    let items = page.into_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id.as_deref(), Some("65a1"));
    assert_eq!(items[0].stock, Some(3));
}

#[tokio::test]
async fn test_expiry_header_refreshes_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tickets"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Token-Expires-At", "2099-06-01T00:00:00Z")
                .set_body_json(serde_json::json!([])),
        )
        .mount(&mock_server)
        .await;

    let store = healthy_store();
    let client = ApiClient::new(config_for(&mock_server), store.clone()).unwrap();
    client.get("/tickets").await.unwrap();

    assert_eq!(store.expiry().as_deref(), Some("2099-06-01T00:00:00Z"));
    assert_eq!(store.token().as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn test_expiry_header_on_error_response_still_refreshes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tickets/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("X-Token-Expires-At", "2099-07-01T00:00:00Z")
                .set_body_string("not found"),
        )
        .mount(&mock_server)
        .await;

    let store = healthy_store();
    let client = ApiClient::new(config_for(&mock_server), store.clone()).unwrap();
    let result = client.get("/tickets/missing").await;

    assert!(matches!(
        result,
        Err(ClientError::Status {
            status_code: 404,
            ..
        })
    ));
    assert_eq!(store.expiry().as_deref(), Some("2099-07-01T00:00:00Z"));
}

#[tokio::test]
async fn test_unauthorized_ends_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = healthy_store();
    let client = ApiClient::new(config_for(&mock_server), store.clone()).unwrap();
    let result = client.get("/repuestos").await;

    assert!(matches!(result, Err(ClientError::SessionEnded)));
    assert!(store.session().is_none());

    let again = client.get("/repuestos").await;
    assert!(matches!(again, Err(ClientError::NotAuthenticated)));
}

#[tokio::test]
async fn test_unauthorized_for_replaced_token_keeps_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_delay(std::time::Duration::from_millis(200))
                .set_body_string("expired"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = healthy_store();
    let client = ApiClient::new(config_for(&mock_server), store.clone()).unwrap();
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/repuestos").await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    store
        .update_credentials(Some("tok-2"), Some(FAR_EXPIRY))
        .unwrap();

    let result = pending.await.unwrap();
    assert!(matches!(
        result,
        Err(ClientError::Status {
            status_code: 401,
            ..
        })
    ));
    assert_eq!(store.token().as_deref(), Some("tok-2"));
}

#[tokio::test]
async fn test_get_retries_transient_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(config_for(&mock_server), healthy_store()).unwrap();
    let response = client.get("/repuestos").await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_post_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tickets"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(config_for(&mock_server), healthy_store()).unwrap();
    let result = client
        .post_json("/tickets", serde_json::json!({"device": "phone"}))
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Status {
            status_code: 503,
            ..
        })
    ));
}

#[tokio::test]
async fn test_login_saves_session_without_authorization_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_partial_json(serde_json::json!({"email": "ana@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "fresh-token",
            "expiresAt": FAR_EXPIRY,
            "user": {"_id": {"$oid": "65f0"}, "role": "admin"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemorySessionStore::new());
    let client = ApiClient::new(config_for(&mock_server), store.clone()).unwrap();
    let session = client
        .login(&Credentials::new("ana@example.com", "secret"))
        .await
        .unwrap();

    assert_eq!(session.token, "fresh-token");
    assert_eq!(store.token().as_deref(), Some("fresh-token"));
    assert_eq!(store.expiry().as_deref(), Some(FAR_EXPIRY));
    assert_eq!(
        store.session().and_then(|s| s.user_id).as_deref(),
        Some("65f0")
    );

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_login_rejected_is_plain_status_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&mock_server)
        .await;

    let store = healthy_store();
    let client = ApiClient::new(config_for(&mock_server), store.clone()).unwrap();
    let result = client
        .login(&Credentials::new("ana@example.com", "wrong"))
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Status {
            status_code: 401,
            ..
        })
    ));
    // A failed login does not end the existing session
    assert_eq!(store.token().as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn test_page_source_follows_meta() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .and(query_param("page", "1"))
        .and(query_param("perPage", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"_id": "a"}, {"_id": "b"}],
            "meta": {"page": 1, "perPage": 2, "total": 3, "hasPrev": false, "hasNext": true}
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"_id": {"$oid": "c"}}],
            "meta": {"page": "2", "hasPrev": "true", "hasNext": false}
        })))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(config_for(&mock_server), healthy_store()).unwrap();
    let source: PageSource<SparePart, _> = PageSource::with_decoder(
        RouteFetcher::new(client.clone(), "/repuestos").per_page(2),
        client.decoder().clone(),
    );

    let first = source.load(1).await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.prev_key, None);
    assert_eq!(first.next_key, Some(2));

    let all = source.load_all(1, 10).await.unwrap();
    let ids: Vec<_> = all.iter().filter_map(|p| p.id.clone()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_page_source_surfaces_transport_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repuestos"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(config_for(&mock_server), healthy_store()).unwrap();
    let source = client.page_source::<SparePart>("/repuestos");
    let result = source.load(1).await;

    assert!(matches!(
        result,
        Err(ClientError::Status {
            status_code: 500,
            ..
        })
    ));
}
