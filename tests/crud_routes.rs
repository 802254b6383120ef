use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use crud_scaffold::{
    add_crud_routes, app_router, load_from_path, resolve, resource_routes, AppState, CrudResource, CrudRouteOptions,
    FullConfig, MemoryStore, Operation, ResolvedModel, Settings,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn model() -> ResolvedModel {
    let config = FullConfig {
        entities: serde_json::from_str(
            r#"[
              {"name": "Todo", "table": "todo", "path": "todo", "fields": [
                {"name": "id", "type": "bigint", "primary_key": true},
                {"name": "name", "type": "text", "nullable": false},
                {"name": "done", "type": "bool", "nullable": false, "default": false}
              ]},
              {"name": "Tag", "table": "tag", "path": "tag", "soft_delete": false, "fields": [
                {"name": "id", "type": "bigint", "primary_key": true},
                {"name": "label", "type": "text", "nullable": false}
              ]}
            ]"#,
        )
        .unwrap(),
        default_schema: None,
    };
    resolve(&config).unwrap()
}

fn app() -> Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), model(), Settings::default());
    let api = resource_routes(&state).unwrap();
    app_router(state, api)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(req).await.unwrap()
}

async fn body_json(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn todo_lifecycle() {
    let app = app();

    let resp = send(&app, "POST", "/api/v1/todo", Some(json!({"name": "write docs", "id": 77}))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created["id"], json!(1));
    assert_eq!(created["name"], json!("write docs"));
    assert_eq!(created["done"], json!(false));
    assert_eq!(created["deleted"], json!(false));

    let resp = send(&app, "GET", "/api/v1/todo/1", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["name"], json!("write docs"));

    let resp = send(&app, "PUT", "/api/v1/todo/1", Some(json!({"done": true}))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = body_json(resp).await;
    assert_eq!(updated["done"], json!(true));
    assert_eq!(updated["name"], json!("write docs"));

    let resp = send(&app, "DELETE", "/api/v1/todo/1", None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&app, "GET", "/api/v1/todo/1", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await, json!({"detail": "Not found"}));

    let resp = send(&app, "PUT", "/api/v1/todo/1", Some(json!({"done": false}))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&app, "GET", "/api/v1/todo?deleted=true", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = body_json(resp).await;
    assert_eq!(page["count"], json!(0));
    assert_eq!(page["data"], json!([]));

    let page = body_json(send(&app, "GET", "/api/v1/todo?deleted_at=2024-01-01T00:00:00Z", None).await).await;
    assert_eq!(page["count"], json!(0));
}

#[tokio::test]
async fn hard_delete_entity_loses_rows() {
    let app = app();
    send(&app, "POST", "/api/v1/tag", Some(json!({"label": "home"}))).await;
    let resp = send(&app, "DELETE", "/api/v1/tag/1", None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = send(&app, "DELETE", "/api/v1/tag/1", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let page = body_json(send(&app, "GET", "/api/v1/tag", None).await).await;
    assert_eq!(page["count"], json!(0));
}

#[tokio::test]
async fn list_paginates_with_links() {
    let app = app();
    for i in 0..5 {
        let resp = send(&app, "POST", "/api/v1/todo", Some(json!({"name": format!("t{}", i)}))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = send(&app, "GET", "/api/v1/todo?limit=2&offset=2", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = body_json(resp).await;
    assert_eq!(page["count"], json!(5));
    assert_eq!(page["data"].as_array().unwrap().len(), 2);
    assert_eq!(page["next"], json!("http://localhost/api/v1/todo?limit=2&offset=4"));
    assert_eq!(page["previous"], json!("http://localhost/api/v1/todo?limit=2"));

    let page = body_json(send(&app, "GET", "/api/v1/todo?limit=2&offset=4", None).await).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["next"], Value::Null);
    assert_eq!(page["previous"], json!("http://localhost/api/v1/todo?limit=2&offset=2"));

    let page = body_json(send(&app, "GET", "/api/v1/todo", None).await).await;
    assert_eq!(page["count"], json!(5));
    assert_eq!(page["previous"], Value::Null);
    assert_eq!(page["next"], Value::Null);
}

#[tokio::test]
async fn list_filters_on_declared_fields() {
    let app = app();
    send(&app, "POST", "/api/v1/todo", Some(json!({"name": "a", "done": true}))).await;
    send(&app, "POST", "/api/v1/todo", Some(json!({"name": "b"}))).await;

    let page = body_json(send(&app, "GET", "/api/v1/todo?done=true&unknown=1", None).await).await;
    assert_eq!(page["count"], json!(1));
    assert_eq!(page["data"][0]["name"], json!("a"));

    let resp = send(&app, "GET", "/api/v1/todo?done=maybe", None).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn invalid_input_is_422() {
    let app = app();
    for uri in ["/api/v1/todo?limit=0", "/api/v1/todo?limit=101", "/api/v1/todo?offset=-3"] {
        let resp = send(&app, "GET", uri, None).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "{}", uri);
    }

    let resp = send(&app, "GET", "/api/v1/todo/abc", None).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = send(&app, "POST", "/api/v1/todo", Some(json!({"done": true}))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(resp).await, json!({"detail": "name is required"}));

    let resp = send(&app, "POST", "/api/v1/todo", Some(json!({"name": 3}))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn disabled_routes_are_not_served() {
    let model = model();
    let todo = model.entity("Todo").unwrap().clone();
    let resource = CrudResource::from_entity(todo).unwrap();
    let options = CrudRouteOptions::default()
        .disable(Operation::GetAll)
        .disable(Operation::GetOne)
        .disable(Operation::PutOne)
        .disable(Operation::DeleteOne)
        .path_suffix("/");
    let app = add_crud_routes(Router::new(), "/todo", Arc::new(MemoryStore::new()), resource, &options);

    let resp = send(&app, "POST", "/todo/", Some(json!({"name": "a"}))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = send(&app, "GET", "/todo/", None).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let resp = send(&app, "GET", "/todo/1/", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn common_routes_report_status() {
    let app = app();
    let resp = send(&app, "GET", "/health", None).await;
    assert_eq!(body_json(resp).await, json!({"status": "ok"}));
    let resp = send(&app, "GET", "/ready", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&app, "GET", "/version", None).await;
    assert_eq!(body_json(resp).await["version"], json!("0.0.1"));
}

#[tokio::test]
async fn sample_config_mounts_nested_relations() {
    let config = load_from_path("config/sample", None).await.unwrap();
    let state = AppState::new(Arc::new(MemoryStore::new()), resolve(&config).unwrap(), Settings::default());
    let app = app_router(state.clone(), resource_routes(&state).unwrap());

    let resp = send(&app, "POST", "/api/v1/user", Some(json!({"name": "ann", "email": "ann@example.com"}))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = send(&app, "POST", "/api/v1/todo", Some(json!({"name": "a", "user": 1, "due_on": "2024-05-01"}))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["user"], json!(1));

    let resp = send(&app, "POST", "/api/v1/user", Some(json!({"name": "bob", "email": "nope"}))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
