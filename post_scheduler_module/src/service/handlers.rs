use std::path::PathBuf;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use compose_module::{ComposeError, ComposeParams, ImageInput};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::delivery::{DeliveryError, Payload};
use crate::scheduler::{
    remove_attachment, NewTask, Recurrence, SchedulerError, Task, TaskPatch, TaskStatus,
};

use super::forms::{parse_schedule_time, persist_upload, read_form, FormFields};
use super::state::AppState;

/// JSON error body `{"error": "..."}` with a status code.
#[derive(Debug)]
pub(super) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

pub(super) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /api/schedules
pub(super) async fn list_schedules(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state
        .scheduler
        .store()
        .list_all()
        .map_err(|err| ApiError::internal("failed to list schedules", err))?;
    Ok(Json(tasks))
}

/// POST /api/schedule
pub(super) async fn create_schedule(State(state): State<AppState>, multipart: Multipart) -> ApiResult {
    let mut form = read_form(multipart).await?;

    let channel_id = form
        .text("channelId")
        .ok_or_else(|| ApiError::bad_request("channelId is required."))?
        .to_string();
    let scheduled_time = parse_schedule_time(form.raw_text("datetime").unwrap_or(""))
        .map_err(ApiError::bad_request)?;
    let recurrence = parse_recurrence(&form)?.unwrap_or_default();
    let message = non_blank(form.raw_text("message"));
    let channel_name = form.text("channelName").map(str::to_string);
    let image = form.take_file("image");

    if message.is_none() && image.is_none() {
        return Err(ApiError::bad_request(
            "Must provide either message or image.",
        ));
    }

    let attachment_path = match &image {
        Some(upload) => Some(
            persist_upload(&state.config.uploads_dir, upload)
                .await
                .map_err(|err| ApiError::internal("failed to store upload", err))?,
        ),
        None => None,
    };

    let new_task = NewTask {
        channel_id,
        channel_name,
        message,
        attachment_path: attachment_path.clone(),
        scheduled_time,
        recurrence,
    };
    match state.scheduler.store().insert(new_task) {
        Ok(task) => {
            info!(
                "scheduled task {} for channel {} at {}",
                task.id,
                task.channel_id,
                task.scheduled_time.to_rfc3339()
            );
            Ok(Json(json!({ "success": true, "task": task })))
        }
        Err(err) => {
            discard_upload(attachment_path);
            Err(ApiError::internal("failed to insert schedule", err))
        }
    }
}

/// PUT /api/schedule/:id
pub(super) async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult {
    let id = parse_task_id(&id)?;
    let mut form = read_form(multipart).await?;
    let store = state.scheduler.store();

    let existing = store
        .get(id)
        .map_err(|err| ApiError::internal("failed to load schedule", err))?
        .ok_or_else(|| ApiError::not_found(format!("Schedule {} not found.", id)))?;

    let scheduled_time = match form.text("datetime") {
        Some(raw) => Some(parse_schedule_time(raw).map_err(ApiError::bad_request)?),
        None => None,
    };
    let mut patch = TaskPatch {
        channel_id: form.text("channelId").map(str::to_string),
        channel_name: form.text("channelName").map(str::to_string),
        message: form.raw_text("message").map(str::to_string),
        attachment_path: None,
        scheduled_time,
        recurrence: parse_recurrence(&form)?,
        // Editing re-arms a task that previously failed or finished.
        status: matches!(existing.status, TaskStatus::Error | TaskStatus::Sent)
            .then_some(TaskStatus::Pending),
    };

    let image = form.take_file("image");
    let merged_message = match patch.message.as_deref() {
        Some(value) => non_blank(Some(value)),
        None => existing.message.clone(),
    };
    if merged_message.is_none() && image.is_none() && existing.attachment_path.is_none() {
        return Err(ApiError::bad_request(
            "Must provide either message or image.",
        ));
    }

    if let Some(upload) = &image {
        patch.attachment_path = Some(
            persist_upload(&state.config.uploads_dir, upload)
                .await
                .map_err(|err| ApiError::internal("failed to store upload", err))?,
        );
    }
    let new_attachment = patch.attachment_path.clone();

    match store.update(id, patch) {
        Ok(task) => {
            if let (Some(new_path), Some(old_path)) = (&new_attachment, &existing.attachment_path) {
                if new_path != old_path {
                    remove_attachment(old_path);
                }
            }
            info!("updated task {}", task.id);
            Ok(Json(json!({ "success": true, "task": task })))
        }
        Err(SchedulerError::TaskNotFound(_)) => {
            discard_upload(new_attachment);
            Err(ApiError::not_found(format!("Schedule {} not found.", id)))
        }
        Err(err) => {
            discard_upload(new_attachment);
            Err(ApiError::internal("failed to update schedule", err))
        }
    }
}

/// DELETE /api/schedule/:id. Deleting an unknown id succeeds.
pub(super) async fn delete_schedule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_task_id(&id)?;
    let store = state.scheduler.store();

    let existing = store
        .get(id)
        .map_err(|err| ApiError::internal("failed to load schedule", err))?;
    match store.delete(id) {
        Ok(()) => info!("deleted task {}", id),
        Err(SchedulerError::TaskNotFound(_)) => {}
        Err(err) => return Err(ApiError::internal("failed to delete schedule", err)),
    }
    if let Some(path) = existing.and_then(|task| task.attachment_path) {
        remove_attachment(&path);
    }
    Ok(Json(json!({ "success": true })))
}

/// GET /api/channels
pub(super) async fn list_channels(State(state): State<AppState>) -> Response {
    let delivery = state.scheduler.delivery();
    if !delivery.is_ready() {
        return not_ready_response();
    }
    match delivery.list_channels().await {
        Ok(channels) => Json(channels).into_response(),
        Err(DeliveryError::NotReady) => not_ready_response(),
        Err(err) => {
            error!("Error fetching channels: {}", err);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch channels")
                .into_response()
        }
    }
}

fn not_ready_response() -> Response {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Bot not ready yet").into_response()
}

/// POST /api/send-now
pub(super) async fn send_now(State(state): State<AppState>, multipart: Multipart) -> ApiResult {
    let mut form = read_form(multipart).await?;
    let channel_id = form
        .text("channelId")
        .ok_or_else(|| ApiError::bad_request("channelId is required."))?
        .to_string();
    let message = non_blank(form.raw_text("message"));

    let temp_upload = match form.take_file("image") {
        Some(upload) => Some(
            persist_upload(&state.config.uploads_dir, &upload)
                .await
                .map_err(|err| ApiError::internal("failed to store upload", err))?,
        ),
        None => None,
    };

    let payload = Payload::new(message, temp_upload.clone());
    let result = state.scheduler.send_now(&channel_id, payload).await;
    discard_upload(temp_upload);

    match result {
        Ok(sent) => Ok(Json(json!({ "success": true, "messageId": sent.message_id }))),
        Err(err) => Err(send_now_error(err)),
    }
}

fn send_now_error(err: SchedulerError) -> ApiError {
    match err {
        SchedulerError::EmptyPayload => {
            ApiError::bad_request("Must provide either message or image.")
        }
        SchedulerError::Delivery(DeliveryError::NotReady) => {
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Bot not ready yet")
        }
        SchedulerError::Delivery(err) if err.is_permanent() => ApiError::not_found(err.to_string()),
        SchedulerError::Delivery(err) => {
            warn!("immediate send failed: {}", err);
            ApiError::new(StatusCode::BAD_GATEWAY, err.to_string())
        }
        other => ApiError::internal("immediate send failed", other),
    }
}

/// POST /api/generate
pub(super) async fn generate(State(state): State<AppState>, multipart: Multipart) -> ApiResult {
    let Some(composer) = state.composer.clone() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "AI helper not configured (missing GEMINI_API_KEY)",
        ));
    };
    let mut form = read_form(multipart).await?;
    let params = ComposeParams {
        prompt: form.text("prompt").map(str::to_string),
        image: form
            .take_file("image")
            .map(|upload| ImageInput::from_bytes(&upload.file_name, upload.bytes)),
    };

    match composer.compose(&params).await {
        Ok(output) => Ok(Json(json!({ "text": output.text, "model": output.model }))),
        Err(ComposeError::EmptyRequest) => Err(ApiError::bad_request(
            "Provide a prompt, an image, or both.",
        )),
        Err(ComposeError::MissingApiKey) => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "AI helper not configured (missing GEMINI_API_KEY)",
        )),
        Err(err @ ComposeError::Io(_)) => Err(ApiError::internal("compose failed", err)),
        Err(err) => {
            warn!("compose failed: {}", err);
            Err(ApiError::new(StatusCode::BAD_GATEWAY, err.to_string()))
        }
    }
}

fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid schedule id: {}", raw)))
}

fn parse_recurrence(form: &FormFields) -> Result<Option<Recurrence>, ApiError> {
    form.text("recurrence")
        .map(|raw| raw.parse::<Recurrence>())
        .transpose()
        .map_err(|err| ApiError::bad_request(err.to_string()))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

fn discard_upload(path: Option<PathBuf>) {
    if let Some(path) = path {
        remove_attachment(&path);
    }
}
