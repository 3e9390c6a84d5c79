mod test_support;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use post_scheduler_module::service::{build_router, AppState, ServiceConfig};
use post_scheduler_module::{DeliveryAdapter, Recurrence, Scheduler, SqliteTaskStore, TaskStatus};
use test_support::{insert_task, ScriptedDelivery, KNOWN_CHANNEL};

const BOUNDARY: &str = "post-scheduler-test-boundary";

struct TestApp {
    _temp: TempDir,
    app: Router,
    store: SqliteTaskStore,
    delivery: Arc<ScriptedDelivery>,
    uploads_dir: PathBuf,
}

fn test_app() -> TestApp {
    let temp = TempDir::new().expect("tempdir");
    let uploads_dir = temp.path().join("uploads");
    let config = ServiceConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        schedules_db_path: temp.path().join("schedules.db"),
        uploads_dir: uploads_dir.clone(),
        dashboard_dir: temp.path().join("no-dashboard"),
        scheduler_poll_interval: Duration::from_secs(10),
        scheduler_max_send_attempts: None,
        stale_claim_after: Duration::from_secs(600),
        upload_max_bytes: 1024 * 1024,
        discord_bot_token: None,
        discord_guild_id: None,
        compose: None,
    };
    let store = SqliteTaskStore::new(&config.schedules_db_path).expect("store");
    let delivery = Arc::new(ScriptedDelivery::new());
    let adapter: Arc<dyn DeliveryAdapter> = delivery.clone();
    let state = AppState {
        config: Arc::new(config),
        scheduler: Arc::new(Scheduler::new(store.clone(), adapter)),
        composer: None,
    };
    TestApp {
        _temp: temp,
        app: build_router(state),
        store,
        delivery,
        uploads_dir,
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(
    method: &str,
    uri: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields, file)))
        .expect("request")
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn upload_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn health_endpoints_respond() {
    let test = test_app();
    let (status, body) = send(&test.app, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
    let (status, _) = send(&test.app, empty_request("GET", "/")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_then_list_schedule() {
    let test = test_app();
    let (status, created) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/schedule",
            &[
                ("datetime", "2030-01-02T03:04:05Z"),
                ("channelId", KNOWN_CHANNEL),
                ("channelName", "Guild - #general"),
                ("recurrence", "yearly"),
                ("message", "Happy new year"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["success"], true);
    assert_eq!(created["task"]["status"], "pending");

    let (status, listed) = send_json(&test.app, empty_request("GET", "/api/schedules")).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = listed.as_array().expect("array");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["channelId"], KNOWN_CHANNEL);
    assert_eq!(tasks[0]["channelName"], "Guild - #general");
    assert_eq!(tasks[0]["message"], "Happy new year");
    assert_eq!(tasks[0]["recurrence"], "yearly");
    assert_eq!(tasks[0]["scheduledTime"], 1_893_553_445_000_i64);
    assert!(tasks[0]["attachmentPath"].is_null());
}

#[tokio::test]
async fn create_rejects_missing_payload_and_bad_fields() {
    let test = test_app();
    let (status, body) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/schedule",
            &[
                ("datetime", "2030-01-02T03:04:05Z"),
                ("channelId", KNOWN_CHANNEL),
                ("message", "   "),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Must provide either message or image.");

    let (status, _) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/schedule",
            &[("datetime", "soon"), ("channelId", KNOWN_CHANNEL), ("message", "hi")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/schedule",
            &[
                ("datetime", "2030-01-02T03:04:05Z"),
                ("channelId", KNOWN_CHANNEL),
                ("recurrence", "weekly"),
                ("message", "hi"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/schedule",
            &[("datetime", "2030-01-02T03:04:05Z"), ("message", "hi")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(test.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn image_only_schedule_stores_and_serves_upload() {
    let test = test_app();
    let (status, created) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/schedule",
            &[("datetime", "2030-01-02T03:04:05Z"), ("channelId", KNOWN_CHANNEL)],
            Some(("image", "poster.png", b"fake-png")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let attachment = PathBuf::from(created["task"]["attachmentPath"].as_str().expect("path"));
    assert!(attachment.starts_with(&test.uploads_dir));
    assert_eq!(std::fs::read(&attachment).unwrap(), b"fake-png");

    let file_name = attachment.file_name().unwrap().to_str().unwrap();
    let (status, body) = send(
        &test.app,
        empty_request("GET", &format!("/uploads/{}", file_name)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"fake-png");
}

#[tokio::test]
async fn update_merges_fields_and_keeps_attachment() {
    let test = test_app();
    std::fs::create_dir_all(&test.uploads_dir).unwrap();
    let image = test.uploads_dir.join("image-existing.png");
    std::fs::write(&image, b"old").unwrap();
    let task = insert_task(
        &test.store,
        Some("draft"),
        Some(image.clone()),
        chrono::Utc::now() + chrono::Duration::days(2),
        Recurrence::Once,
    );
    test.store.set_status(task.id, TaskStatus::Error).unwrap();

    let (status, updated) = send_json(
        &test.app,
        multipart_request(
            "PUT",
            &format!("/api/schedule/{}", task.id),
            &[("message", "final copy")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["task"]["message"], "final copy");

    let stored = test.store.get(task.id).unwrap().unwrap();
    assert_eq!(stored.attachment_path, Some(image.clone()));
    assert_eq!(stored.status, TaskStatus::Pending);
    assert_eq!(stored.scheduled_time, task.scheduled_time);
    assert!(image.exists());
}

#[tokio::test]
async fn update_with_new_image_replaces_old_file() {
    let test = test_app();
    std::fs::create_dir_all(&test.uploads_dir).unwrap();
    let old_image = test.uploads_dir.join("image-old.png");
    std::fs::write(&old_image, b"old").unwrap();
    let task = insert_task(
        &test.store,
        None,
        Some(old_image.clone()),
        chrono::Utc::now() + chrono::Duration::days(2),
        Recurrence::Yearly,
    );

    let (status, _) = send_json(
        &test.app,
        multipart_request(
            "PUT",
            &format!("/api/schedule/{}", task.id),
            &[],
            Some(("image", "new.jpg", b"new")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stored = test.store.get(task.id).unwrap().unwrap();
    let new_image = stored.attachment_path.expect("attachment");
    assert_ne!(new_image, old_image);
    assert_eq!(std::fs::read(&new_image).unwrap(), b"new");
    assert!(!old_image.exists());
}

#[tokio::test]
async fn update_unknown_schedule_is_not_found() {
    let test = test_app();
    let (status, _) = send_json(
        &test.app,
        multipart_request(
            "PUT",
            &format!("/api/schedule/{}", uuid::Uuid::new_v4()),
            &[("message", "hello")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &test.app,
        multipart_request("PUT", "/api/schedule/not-a-uuid", &[("message", "hi")], None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_is_idempotent_and_removes_attachment() {
    let test = test_app();
    std::fs::create_dir_all(&test.uploads_dir).unwrap();
    let image = test.uploads_dir.join("image-delete.png");
    std::fs::write(&image, b"bytes").unwrap();
    let task = insert_task(
        &test.store,
        Some("cancel me"),
        Some(image.clone()),
        chrono::Utc::now() + chrono::Duration::days(1),
        Recurrence::Once,
    );
    let uri = format!("/api/schedule/{}", task.id);

    let (status, body) = send_json(&test.app, empty_request("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(test.store.get(task.id).unwrap().is_none());
    assert!(!image.exists());

    let (status, _) = send_json(&test.app, empty_request("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn channels_report_unavailable_until_ready() {
    let test = test_app();
    test.delivery.set_ready(false);
    let (status, body) = send_json(&test.app, empty_request("GET", "/api/channels")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Bot not ready yet");

    test.delivery.set_ready(true);
    test.delivery.add_channel("2002");
    let (status, body) = send_json(&test.app, empty_request("GET", "/api/channels")).await;
    assert_eq!(status, StatusCode::OK);
    let channels = body.as_array().expect("array");
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0]["id"], KNOWN_CHANNEL);
    assert_eq!(channels[0]["name"], "Guild - #1001");
}

#[tokio::test]
async fn send_now_delivers_and_cleans_up_upload() {
    let test = test_app();
    let (status, body) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/send-now",
            &[("channelId", KNOWN_CHANNEL), ("message", "right now")],
            Some(("image", "now.png", b"img")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["messageId"], "msg-1");

    let sends = test.delivery.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].text.as_deref(), Some("right now"));
    assert!(sends[0].attachment_path.is_some());
    assert_eq!(upload_count(&test.uploads_dir), 0);
    assert!(test.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn send_now_maps_failures_to_status_codes() {
    let test = test_app();
    let (status, _) = send_json(
        &test.app,
        multipart_request("POST", "/api/send-now", &[("channelId", KNOWN_CHANNEL)], None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/send-now",
            &[("channelId", "424242"), ("message", "hello")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    test.delivery.set_ready(false);
    let (status, _) = send_json(
        &test.app,
        multipart_request(
            "POST",
            "/api/send-now",
            &[("channelId", KNOWN_CHANNEL), ("message", "hello")],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(test.delivery.send_count(), 0);
}

#[tokio::test]
async fn generate_requires_configured_helper() {
    let test = test_app();
    let (status, body) = send_json(
        &test.app,
        multipart_request("POST", "/api/generate", &[("prompt", "a birthday post")], None),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("GEMINI_API_KEY"));
}
