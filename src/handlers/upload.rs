use axum::{
    extract::{Multipart, State},
    Json,
};
use log::{debug, info};
use std::path::Path;

use crate::{error::RelayError, state::AppState, types::UploadResponse};

pub const UPLOAD_URL_PREFIX: &str = "/uploads";

/// `POST /api/upload`: stores the multipart `file` field and returns the URL
/// it is served under, for use as a chat request `images` entry.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, RelayError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;

        let filename = stored_name(&original_name);
        let upload_dir = &state.config.upload_dir;
        tokio::fs::create_dir_all(upload_dir).await?;
        tokio::fs::write(upload_dir.join(&filename), &data).await?;

        info!("Stored upload {filename} ({} bytes)", data.len());
        return Ok(Json(UploadResponse {
            url: format!("{UPLOAD_URL_PREFIX}/{filename}"),
        }));
    }

    debug!("Upload request without a file field");
    Err(RelayError::BadRequest("No file uploaded".to_string()))
}

/// Unique on-disk name keeping the client's extension, `jpg` when it has none.
fn stored_name(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string());

    format!(
        "{}-{}.{ext}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}
