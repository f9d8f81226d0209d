//! End-to-end tests of the HTTP surface over in-memory services.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use petmatch_api::{api_router, AppConfig, AppState, Services};
use petmatch_core::testing::{
    record_fixture, MemoryImageStore, MemoryNotificationRepository, MemoryRecordRepository,
    StaticCandidateIndex,
};
use petmatch_core::{
    Candidate, ColorSignature, ImageEmbedding, NewNotification, NotificationRepository,
    RecordStatus, Rgb,
};
use petmatch_inference::MockEmbeddingBackend;

const BOUNDARY: &str = "petmatch-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        name, value
                    )
                    .as_bytes(),
                );
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: image/jpeg\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

struct Harness {
    app: Router,
    records: MemoryRecordRepository,
    notifications: MemoryNotificationRepository,
}

fn harness_with(images: MemoryImageStore, embedder: MockEmbeddingBackend) -> Harness {
    let records = MemoryRecordRepository::new();
    let notifications = MemoryNotificationRepository::new();
    let services = Services {
        images: Arc::new(images),
        records: Arc::new(records.clone()),
        index: Arc::new(records.clone()),
        notifications: Arc::new(notifications.clone()),
        embedder: Arc::new(embedder),
    };
    Harness {
        app: api_router(AppState::new(services, AppConfig::default())),
        records,
        notifications,
    }
}

fn harness() -> Harness {
    harness_with(
        MemoryImageStore::new(),
        MockEmbeddingBackend::new().with_dimension(4),
    )
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["embedding_model"], "mock");
}

#[tokio::test]
async fn test_create_record_inline_enrichment() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        multipart_request(
            "/api/v1/records",
            &[
                Part::Text("status", "LOST"),
                Part::Text("pet_name", "Mochi"),
                Part::Text("species", "cat"),
                Part::File("images", "a.jpg", b"photo-a"),
                Part::File("images", "b.png", b"photo-b"),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["enrichment"], "applied");
    assert_eq!(body["record"]["status"], "LOST");
    assert_eq!(body["record"]["pet_name"], "Mochi");
    assert_eq!(body["record"]["has_embedding"], true);
    assert_eq!(body["record"]["embedding_dimension"], 4);
    assert_eq!(body["record"]["image_urls"].as_array().unwrap().len(), 2);
    assert_eq!(body["report"]["images_stored"], 2);
    assert_eq!(body["tasks"]["signature_attached"], true);
    assert!(body["record"].get("owner_id").is_none());
    assert_eq!(h.records.len(), 1);
}

#[tokio::test]
async fn test_create_record_without_images_is_400() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        multipart_request("/api/v1/records", &[Part::Text("status", "FOUND")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("image"));
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn test_create_record_storage_down_is_503() {
    let h = harness_with(MemoryImageStore::failing(), MockEmbeddingBackend::new());
    let (status, body) = send(
        &h.app,
        multipart_request(
            "/api/v1/records",
            &[Part::File("image", "a.jpg", b"photo")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("save"));
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn test_create_record_survives_embedding_outage() {
    let h = harness_with(MemoryImageStore::new(), MockEmbeddingBackend::failing());
    let (status, body) = send(
        &h.app,
        multipart_request(
            "/api/v1/records",
            &[Part::File("images", "a.jpg", b"photo")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["enrichment"], "none");
    assert_eq!(body["record"]["has_embedding"], false);
}

#[tokio::test]
async fn test_found_report_notifies_lost_owner() {
    let records = MemoryRecordRepository::new();
    let notifications = MemoryNotificationRepository::new();

    let mut lost = record_fixture(RecordStatus::Lost, Some(vec![1.0, 0.0]), None);
    lost.owner_id = Some("owner-7".to_string());
    lost.pet_name = Some("Biscuit".to_string());
    let mut weak = record_fixture(RecordStatus::Lost, Some(vec![0.0, 1.0]), None);
    weak.owner_id = Some("owner-8".to_string());
    records.seed(lost.clone());
    records.seed(weak.clone());

    let index = StaticCandidateIndex::new(vec![
        Candidate {
            record: lost.clone(),
            similarity: 0.9,
        },
        Candidate {
            record: weak,
            similarity: 0.6,
        },
    ]);
    let services = Services {
        images: Arc::new(MemoryImageStore::new()),
        records: Arc::new(records.clone()),
        index: Arc::new(index),
        notifications: Arc::new(notifications.clone()),
        embedder: Arc::new(MockEmbeddingBackend::new().with_dimension(2)),
    };
    let app = api_router(AppState::new(services, AppConfig::default()));

    let (status, body) = send(
        &app,
        multipart_request(
            "/api/v1/records",
            &[
                Part::Text("status", "FOUND"),
                Part::File("images", "found.jpg", b"found-photo"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["tasks"]["notifications_sent"], 1);

    let sent = notifications.all();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_id, "owner-7");
    assert_eq!(sent[0].lost_record_id, lost.id);
    assert_eq!(sent[0].found_record_id.to_string(), body["record"]["id"]);
}

#[tokio::test]
async fn test_backfill_attaches_missing_signatures() {
    let h = harness();
    let mut pending = record_fixture(RecordStatus::Lost, None, None);
    pending.owner_id = Some("owner-1".to_string());
    h.records.seed(pending.clone());
    h.records.seed(record_fixture(
        RecordStatus::Found,
        Some(vec![1.0, 0.0, 0.0, 0.0]),
        None,
    ));

    let (status, body) = send(
        &h.app,
        Request::post("/api/v1/admin/backfill-signatures?limit=10")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 1);
    assert_eq!(body["attached"], 1);
    assert_eq!(body["items"][0]["record_id"], pending.id.to_string());

    let stored = h
        .records
        .all()
        .into_iter()
        .find(|r| r.id == pending.id)
        .unwrap();
    assert_eq!(stored.embedding.map(|v| v.len()), Some(4));
    assert!(h.notifications.all().is_empty());
}

#[tokio::test]
async fn test_search_returns_every_score_component() {
    let brown = ColorSignature::new(vec![Rgb::new(120, 80, 40)], vec![1.0]).unwrap();
    let embedder = MockEmbeddingBackend::new().with_dimension(2).with_response(
        "query-photo",
        ImageEmbedding {
            vector: vec![1.0, 0.0],
            colors: brown.clone(),
        },
    );
    let h = harness_with(MemoryImageStore::new(), embedder);
    let found = record_fixture(RecordStatus::Found, Some(vec![1.0, 0.0]), Some(brown));
    h.records.seed(found.clone());
    h.records
        .seed(record_fixture(RecordStatus::Lost, Some(vec![1.0, 0.0]), None));

    let (status, body) = send(
        &h.app,
        multipart_request(
            "/api/v1/search",
            &[
                Part::Text("mode", "lost"),
                Part::File("image", "q.jpg", b"query-photo"),
            ],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let m = &body["matches"][0];
    assert_eq!(m["id"], found.id.to_string());
    assert!((m["embedding_similarity"].as_f64().unwrap() - 1.0).abs() < 1e-5);
    assert!((m["color_similarity"].as_f64().unwrap() - 1.0).abs() < 1e-5);
    assert!((m["feature_score"].as_f64().unwrap() - 0.5).abs() < 1e-5);
    assert!((m["combined_score"].as_f64().unwrap() - 0.85).abs() < 1e-5);
}

#[tokio::test]
async fn test_search_with_no_candidates_is_empty_200() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        multipart_request(
            "/api/v1/search",
            &[Part::File("image", "q.jpg", b"anything")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matches"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_search_embedding_failure_is_502() {
    let h = harness_with(MemoryImageStore::new(), MockEmbeddingBackend::failing());
    let (status, body) = send(
        &h.app,
        multipart_request(
            "/api/v1/search",
            &[Part::File("image", "q.jpg", b"anything")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("analyze"));
}

#[tokio::test]
async fn test_search_without_image_is_400() {
    let h = harness();
    let (status, _) = send(
        &h.app,
        multipart_request("/api/v1/search", &[Part::Text("mode", "found")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_list_and_update_status() {
    let h = harness();
    let mut cat = record_fixture(RecordStatus::Lost, None, None);
    cat.pet_name = Some("Mochi".to_string());
    cat.attributes.species = Some("Cat".to_string());
    h.records.seed(cat.clone());
    h.records
        .seed(record_fixture(RecordStatus::Found, None, None));

    let (status, body) = send(
        &h.app,
        Request::get(format!("/api/v1/records/{}", cat.id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pet_name"], "Mochi");

    let (status, body) = send(
        &h.app,
        Request::get("/api/v1/records?status=lost&q=mochi&species=CAT")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["records"][0]["id"], cat.id.to_string());

    let (status, body) = send(
        &h.app,
        Request::patch(format!("/api/v1/records/{}/status", cat.id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"status":"REUNITED"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REUNITED");

    let (status, _) = send(
        &h.app,
        Request::get(format!("/api/v1/records/{}", uuid::Uuid::now_v7()))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &h.app,
        Request::get("/api/v1/records?status=sleeping")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notification_mailbox() {
    let h = harness();
    let found = record_fixture(RecordStatus::Found, None, None);
    let lost = record_fixture(RecordStatus::Lost, None, None);
    let stored = h
        .notifications
        .insert(NewNotification::pet_match("owner-1".into(), &found, &lost, 0.91))
        .await
        .unwrap();

    let (status, body) = send(
        &h.app,
        Request::get("/api/v1/notifications?recipient_id=owner-1&unread_only=true")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["notifications"][0]["kind"], "pet_match");

    for _ in 0..2 {
        let (status, body) = send(
            &h.app,
            Request::post(format!("/api/v1/notifications/{}/read", stored.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["read_at"].is_null());
    }

    let (_, body) = send(
        &h.app,
        Request::get("/api/v1/notifications?recipient_id=owner-1&unread_only=true")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        Request::get("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/search"].is_object());
    assert!(body["paths"]["/api/v1/records/{id}"].is_object());
}
