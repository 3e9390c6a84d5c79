use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::multipart::{Multipart, MultipartError};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use uuid::Uuid;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Clone)]
pub(super) struct UploadedFile {
    pub(super) file_name: String,
    pub(super) bytes: Vec<u8>,
}

/// A decoded multipart form. File parts with no content (an untouched file input)
/// are dropped.
#[derive(Debug, Default)]
pub(super) struct FormFields {
    text: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormFields {
    /// Trimmed value, `None` when absent or blank.
    pub(super) fn text(&self, name: &str) -> Option<&str> {
        self.text
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Raw value, including an explicit empty string.
    pub(super) fn raw_text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    pub(super) fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

pub(super) async fn read_form(mut multipart: Multipart) -> Result<FormFields, MultipartError> {
    let mut form = FormFields::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                form.files.insert(
                    name,
                    UploadedFile {
                        file_name,
                        bytes: bytes.to_vec(),
                    },
                );
            }
            None => {
                let value = field.text().await?;
                form.text.insert(name, value);
            }
        }
    }
    Ok(form)
}

/// Writes an upload under `uploads_dir` with a collision-free name and returns its path.
pub(super) async fn persist_upload(
    uploads_dir: &Path,
    upload: &UploadedFile,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(uploads_dir).await?;
    let file_name = format!(
        "image-{}-{}{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        upload_extension(&upload.file_name)
    );
    let path = uploads_dir.join(file_name);
    tokio::fs::write(&path, &upload.bytes).await?;
    Ok(path)
}

fn upload_extension(original: &str) -> String {
    Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Accepts RFC 3339, Unix milliseconds, or a naive `YYYY-MM-DDTHH:MM[:SS]` value (what a
/// browser `datetime-local` input submits) read in the server's local timezone.
pub fn parse_schedule_time(raw: &str) -> Result<DateTime<Utc>, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("datetime is required".to_string());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if value.chars().all(|c| c.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| format!("timestamp out of range: {}", value));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| format!("{} does not exist in the local timezone", value));
        }
    }
    Err(format!("invalid datetime: {}", value))
}
