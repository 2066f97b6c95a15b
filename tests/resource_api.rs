use autoresource::config::FullConfig;
use autoresource::extractors::trust_subject_header;
use autoresource::filter::FilterMode;
use autoresource::{
    build_registry, common_routes, resource_routes, AppState, CacheLayer, ControllerServices, MemoryAuditStore,
    MemoryStore, StatusColumnScope,
};
use autoresource::config::InvalidationScope;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::{middleware, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    audit: Arc<MemoryAuditStore>,
}

fn config() -> FullConfig {
    FullConfig {
        resources: serde_json::from_value(json!([
            {"controller": "app::http::controllers::ArticleController"},
            {"controller": "app::http::controllers::WidgetController", "sorting_key": "name"}
        ]))
        .unwrap(),
        entities: serde_json::from_value(json!([
            {
                "name": "app::models::Article",
                "table": "articles",
                "fillable": ["title", "body"],
                "publication_status": true,
                "relations": [
                    {"name": "comments", "kind": "has_many", "table": "comments", "foreign_key": "article_id"}
                ]
            },
            {"name": "app::models::Widget", "table": "widgets", "fillable": ["name"]}
        ]))
        .unwrap(),
        validators: serde_json::from_value(json!([
            {"name": "app::http::requests::ArticleRequest", "rules": {"title": "required|string|max:255"}}
        ]))
        .unwrap(),
        filters: serde_json::from_value(json!([
            {"name": "app::http::filters::ArticleFilter", "conditions": []}
        ]))
        .unwrap(),
    }
}

async fn harness(mode: FilterMode) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.create_table("articles", &["id", "title", "body", "publication_status_id"]);
    store.create_table("comments", &["id", "article_id", "text"]);
    store.create_table("widgets", &["id", "name"]);
    store
        .seed("articles", json!({"title": "Rust", "body": "ownership", "publication_status_id": 1}))
        .unwrap();
    store
        .seed("articles", json!({"title": "Zebra", "body": "stripes", "publication_status_id": 1}))
        .unwrap();
    store
        .seed("articles", json!({"title": "Draft", "body": "wip", "publication_status_id": 2}))
        .unwrap();
    store.seed("comments", json!({"article_id": 1, "text": "great"})).unwrap();
    store.seed("widgets", json!({"name": "bolt"})).unwrap();

    let audit = Arc::new(MemoryAuditStore::new());
    let config = config();
    let services = ControllerServices {
        registry: Arc::new(build_registry(&config).unwrap()),
        store: store.clone(),
        audit: audit.clone(),
        cache: Arc::new(CacheLayer::new(1_000, InvalidationScope::All)),
        publication: Arc::new(StatusColumnScope::default()),
        filter_mode: mode,
        default_ttl_secs: 60,
    };
    let state = AppState::build(&config, &services).await.unwrap();
    let app = common_routes()
        .merge(resource_routes(state))
        .layer(middleware::from_fn(trust_subject_header));
    Harness { app, store, audit }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>, subject: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(subject) = subject {
        builder = builder.header("X-Subject-Id", subject);
    }
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None, Some("user-1")).await
}

fn titles(body: &Value) -> Vec<String> {
    body["articles"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn ordered_list_is_cached_without_requerying() {
    let h = harness(FilterMode::Permissive).await;
    let uri = "/articles?filter=%7B%22order%22%3A%22title+DESC%22%7D";

    let (status, first) = get(&h.app, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&first), vec!["Zebra", "Rust"]);
    assert_eq!(first["meta"], json!({"http-status": 200, "result": true}));
    assert_eq!(first["articles"]["per_page"], json!(1000));
    let queries = h.store.query_count();

    let (_, second) = get(&h.app, uri).await;
    assert_eq!(first, second);
    assert_eq!(h.store.query_count(), queries);
}

#[tokio::test]
async fn destroying_missing_record_is_404_and_keeps_cache() {
    let h = harness(FilterMode::Permissive).await;
    get(&h.app, "/articles").await;

    let (status, body) = send(&h.app, Method::DELETE, "/articles/42", None, Some("user-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["articles"], json!({}));
    assert_eq!(body["meta"]["http-status"], json!(404));
    assert_eq!(body["meta"]["result"], json!(false));
    assert_eq!(
        body["meta"]["message"],
        json!("No query results for model [app::models::Article] 42")
    );

    let queries = h.store.query_count();
    get(&h.app, "/articles").await;
    assert_eq!(h.store.query_count(), queries);

    let audit = h.audit.records();
    let last = audit.last().unwrap();
    assert_eq!(last.operation_slug, "destroy");
    assert_eq!(last.affected_object_id.as_deref(), Some("42"));
    assert_eq!(last.prior_object_state, None);
}

#[tokio::test]
async fn create_assigns_only_present_fillable_fields_and_flushes_cache() {
    let h = harness(FilterMode::Permissive).await;
    get(&h.app, "/articles").await;
    get(&h.app, "/widgets").await;

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/articles",
        Some(json!({"title": "x", "id": 999, "secret": true})),
        Some("user-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["articles"]["title"], json!("x"));
    assert_eq!(body["articles"]["body"], Value::Null);
    assert_eq!(body["articles"]["id"], json!(4));

    let queries = h.store.query_count();
    get(&h.app, "/articles").await;
    get(&h.app, "/widgets").await;
    assert_eq!(h.store.query_count(), queries + 2);

    let record = h.audit.records().into_iter().find(|r| r.operation_slug == "store").unwrap();
    assert_eq!(record.acting_user_id, "user-1");
    assert_eq!(record.prior_object_state, None);
}

#[tokio::test]
async fn paranoid_mode_rejects_resources_without_filter_before_store_access() {
    let h = harness(FilterMode::Paranoid).await;

    for (method, uri) in [
        (Method::GET, "/widgets"),
        (Method::GET, "/widgets/1"),
        (Method::DELETE, "/widgets/1"),
    ] {
        let (status, body) = send(&h.app, method, uri, None, Some("user-1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], json!("policy_violation"));
    }
    let (status, _) = send(&h.app, Method::PUT, "/widgets/1", Some(json!({"name": "nut"})), Some("user-1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.store.query_count(), 0);
    assert!(h.audit.records().is_empty());

    let (status, _) = get(&h.app, "/articles").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_fields_are_dropped() {
    let h = harness(FilterMode::Permissive).await;
    let (_, body) = get(&h.app, "/articles?fields=title,zzz").await;
    let first = body["articles"]["data"][0].as_object().unwrap();
    assert_eq!(first.keys().collect::<Vec<_>>(), vec!["title"]);
}

#[tokio::test]
async fn unpublished_records_are_never_returned() {
    let h = harness(FilterMode::Permissive).await;
    let (_, list) = get(&h.app, "/articles").await;
    assert!(!titles(&list).contains(&"Draft".to_string()));
    assert_eq!(list["articles"]["total"], json!(2));

    let (status, body) = get(&h.app, "/articles/3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["meta"]["result"], json!(false));

    let (status, body) = get(&h.app, "/articles/1?with=comments,author").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["articles"]["comments"][0]["text"], json!("great"));
    assert!(body["articles"].get("author").is_none());
}

#[tokio::test]
async fn missing_identity_fails_closed() {
    let h = harness(FilterMode::Permissive).await;
    let (status, body) = send(&h.app, Method::GET, "/articles", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("authentication_error"));
    assert_eq!(h.store.query_count(), 0);

    let (status, _) = send(&h.app, Method::POST, "/widgets", Some(json!({"name": "nut"})), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.store.rows("widgets").len(), 1);
}

#[tokio::test]
async fn malformed_filter_behaves_like_no_filter() {
    let h = harness(FilterMode::Permissive).await;
    let (_, plain) = get(&h.app, "/articles").await;
    let (status, malformed) = get(&h.app, "/articles?filter=%7Bnot-json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plain, malformed);
}

#[tokio::test]
async fn contains_filter_matches_case_insensitively() {
    let h = harness(FilterMode::Permissive).await;
    let (_, body) = get(&h.app, "/articles?filter=%7B%22fields%22%3A%7B%22title%22%3A%22zeb%22%7D%7D").await;
    assert_eq!(titles(&body), vec!["Zebra"]);
}

#[tokio::test]
async fn update_uses_wrapped_body_and_records_prior_state() {
    let h = harness(FilterMode::Permissive).await;
    let (status, body) = send(
        &h.app,
        Method::PATCH,
        "/articles/1",
        Some(json!({"articles": {"body": "borrowing"}})),
        Some("user-2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["articles"]["body"], json!("borrowing"));
    assert_eq!(body["articles"]["title"], json!("Rust"));

    let record = h.audit.records().into_iter().find(|r| r.operation_slug == "update").unwrap();
    assert_eq!(record.acting_user_id, "user-2");
    assert!(record.prior_object_state.unwrap().contains("ownership"));

    let (status, _) = send(&h.app, Method::PUT, "/articles/77", Some(json!({"body": "x"})), Some("user-2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_audit() {
    let h = harness(FilterMode::Permissive).await;
    let (status, body) = send(&h.app, Method::POST, "/articles", Some(json!({"body": "no title"})), Some("user-1")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], json!("validation_error"));

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/articles",
        Some(json!({"title": "ok", "publication_status_id": 9})),
        Some("user-1"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn persistence_failure_is_a_500_envelope() {
    let h = harness(FilterMode::Permissive).await;
    h.store.fail_writes(true);
    let (status, body) = send(&h.app, Method::POST, "/widgets", Some(json!({"name": "nut"})), Some("user-1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["meta"]["result"], json!(false));
    assert_eq!(body["widgets"]["name"], json!("nut"));
}

#[tokio::test]
async fn destroy_removes_visible_record() {
    let h = harness(FilterMode::Permissive).await;
    let (status, body) = send(&h.app, Method::DELETE, "/articles/2", None, Some("user-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["message"], json!("The resource has been deleted"));
    assert_eq!(h.store.rows("articles").len(), 2);

    // Unpublished records are outside the destroy scope.
    let (status, _) = send(&h.app, Method::DELETE, "/articles/3", None, Some("user-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.store.rows("articles").len(), 2);
}

#[tokio::test]
async fn validation_rules_are_described() {
    let h = harness(FilterMode::Permissive).await;
    let (status, body) = get(&h.app, "/articles/rules").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["articles"], json!({"title": "required|string|max:255"}));

    let (status, body) = get(&h.app, "/widgets/rules").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["widgets"], json!([]));
    assert_eq!(
        body["meta"]["errors"],
        json!(["Unable to find validation rules for app::models::Widget"])
    );
}

#[tokio::test]
async fn unknown_resource_and_health() {
    let h = harness(FilterMode::Permissive).await;
    let (status, body) = get(&h.app, "/gadgets").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));

    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn show_never_serves_a_cached_list_page() {
    let h = harness(FilterMode::Permissive).await;
    let filter = "%7B%22fields%22%3A%5B%7B%22field%22%3A%22id%22%2C%22operator%22%3A%22%3D%22%2C%22value%22%3A1%7D%5D%7D";
    let (status, list) = get(&h.app, &format!("/articles?filter={}", filter)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["articles"]["total"], json!(1));

    let (status, one) = get(&h.app, "/articles/1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(one["articles"].get("current_page").is_none());
    assert_eq!(one["articles"]["title"], json!("Rust"));

    let (_, again) = get(&h.app, &format!("/articles?filter={}", filter)).await;
    assert_eq!(again["articles"]["data"][0]["id"], json!(1));
}

#[tokio::test]
async fn failed_update_and_destroy_are_500_envelopes_and_keep_cache() {
    let h = harness(FilterMode::Permissive).await;
    let (_, cached) = get(&h.app, "/articles").await;
    h.store.fail_writes(true);

    let (status, body) = send(
        &h.app,
        Method::PATCH,
        "/articles/1",
        Some(json!({"title": "Renamed"})),
        Some("user-1"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["meta"]["result"], json!(false));
    assert_eq!(body["meta"]["message"], json!("An error occurred while updating the resource"));
    assert_eq!(body["articles"]["title"], json!("Rust"));

    let (status, body) = send(&h.app, Method::DELETE, "/articles/1", None, Some("user-1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["meta"]["result"], json!(false));
    assert_eq!(body["meta"]["message"], json!("An error occurred while deleting the resource"));
    assert_eq!(h.store.rows("articles").len(), 3);

    let queries = h.store.query_count();
    let (status, after) = get(&h.app, "/articles").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after, cached);
    assert_eq!(h.store.query_count(), queries);
}
