use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use geo_types::{Geometry, Point};
use rusqlite::types::Value;
use tower::ServiceExt;

use map_engine::config::EngineConfig;
use map_engine::registry::Registry;
use map_engine::server::{AppState, router};
use map_engine::store::{NewFeature, SpatialStore};
use map_engine::tiles::{MVT_CONTENT_TYPE, TileService};

fn seed_store(path: &Path, registry: &Registry) {
    let mut store = SpatialStore::create(path).expect("create");
    store.ensure_schema(registry).expect("schema");
    let hydro = registry.collection("hydro").expect("hydro").clone();
    store
        .insert_features(
            &hydro,
            &[NewFeature {
                id: Some(5),
                geometry: Geometry::Point(Point::new(12.3, 52.3)),
                values: vec![
                    Value::Text("Mill".to_string()),
                    Value::Integer(1),
                    Value::Real(0.4),
                ],
            }],
        )
        .expect("insert");
}

fn state(dir: &Path, timeout: Duration) -> Arc<AppState> {
    let registry =
        Arc::new(Registry::from_config(&EngineConfig::builtin().expect("config")).expect("registry"));
    let database = dir.join("map.sqlite");
    seed_store(&database, &registry);
    Arc::new(AppState::new(TileService::new(registry, database), timeout))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();
    (status, content_type, body)
}

#[tokio::test]
async fn tile_route_answers_with_vector_tile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = router(state(dir.path(), Duration::from_secs(10)), None);

    let (status, content_type, body) = get(app.clone(), "/static_mvt/9/273/168/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(MVT_CONTENT_TYPE));
    assert!(!body.is_empty());

    let (status, _, _) = get(app, "/static_mvt/9/273/168").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_tile_answers_204_with_content_type() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = router(state(dir.path(), Duration::from_secs(10)), None);
    let (status, content_type, body) = get(app, "/static_mvt/9/0/0/").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(content_type.as_deref(), Some(MVT_CONTENT_TYPE));
    assert!(body.is_empty());
}

#[tokio::test]
async fn invalid_tile_requests_answer_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = router(state(dir.path(), Duration::from_secs(10)), None);
    for uri in [
        "/static_mvt/9/abc/168/",
        "/static_mvt/31/0/0/",
        "/static_mvt/9/273/168/?colour=red",
        "/static_mvt/9/273/168/?unit_count=many",
    ] {
        let (status, content_type, body) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(content_type.as_deref(), Some(MVT_CONTENT_TYPE));
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn filter_parameters_reach_the_query() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = router(state(dir.path(), Duration::from_secs(10)), None);
    let (status, _, _) = get(app.clone(), "/static_mvt/9/273/168/?id=5").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(app, "/static_mvt/9/273/168/?id=6").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unregistered_group_has_no_route() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = router(state(dir.path(), Duration::from_secs(10)), None);
    let (status, _, _) = get(app, "/nowhere_mvt/9/273/168/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn elapsed_timeout_answers_500() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = router(state(dir.path(), Duration::ZERO), None);
    let (status, content_type, _) = get(app, "/static_mvt/9/273/168/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content_type.as_deref(), Some(MVT_CONTENT_TYPE));
}

#[tokio::test]
async fn health_and_layer_listing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = router(state(dir.path(), Duration::from_secs(10)), None);

    let (status, _, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(health["status"], "ok");

    let (status, content_type, body) = get(app, "/map/layers.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let style: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(style["sources"][0]["name"], "municipality");
    assert!(style["layers"].as_array().is_some_and(|layers| !layers.is_empty()));
    assert_eq!(style["popups"][0]["layer_id"], "wind");
}

#[tokio::test]
async fn distilled_tree_is_served_as_vector_tiles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let distilled = dir.path().join("mvts");
    fs::create_dir_all(distilled.join("9/273/168")).expect("mkdir");
    fs::write(distilled.join("9/273/168/static.mvt"), b"\x1a\x00").expect("write");
    let app = router(state(dir.path(), Duration::from_secs(10)), Some(&distilled));

    let (status, content_type, body) = get(app.clone(), "/static/mvts/9/273/168/static.mvt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(MVT_CONTENT_TYPE));
    assert_eq!(body, b"\x1a\x00");

    let (status, _, _) = get(app, "/static/mvts/9/273/169/static.mvt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
