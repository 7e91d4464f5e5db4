//! Document upload and management (`/files`).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ClientError, Result};
use crate::http::ApiClient;

/// Extensions the backend can index, with their MIME types.
pub const SUPPORTED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

/// An uploaded document as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub id: i64,
    #[serde(default)]
    pub filename: Option<String>,
    pub original_filename: String,
    pub file_size: u64,
    pub file_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "crate::timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Client for the `/files` endpoints.
#[derive(Clone)]
pub struct FileService {
    api: Arc<ApiClient>,
}

impl FileService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Upload a PDF or DOCX document.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnsupportedFile`] for other extensions, before any
    /// request is made.
    pub async fn upload(&self, path: &Path) -> Result<FileItem> {
        let mime = mime_for(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::UnsupportedFile {
                reason: format!("{} has no file name", path.display()),
            })?;

        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        let part = Part::bytes(bytes).file_name(file_name.clone()).mime_str(mime)?;
        let form = Form::new().part("file", part);

        let item: FileItem = self
            .api
            .post_multipart("/files/upload", form, "Upload failed")
            .await?;
        info!(file_id = item.id, file = %file_name, size = size, "file uploaded");
        Ok(item)
    }

    pub async fn list(&self) -> Result<Vec<FileItem>> {
        self.api.get_json("/files/", "Failed to fetch files").await
    }

    pub async fn get(&self, file_id: i64) -> Result<FileItem> {
        self.api
            .get_json(&format!("/files/{file_id}"), "Failed to fetch file")
            .await
    }

    /// Raw contents of an uploaded document.
    pub async fn download(&self, file_id: i64) -> Result<Vec<u8>> {
        self.api
            .get_bytes(&format!("/files/{file_id}/download"), "Failed to download file")
            .await
    }

    pub async fn delete(&self, file_id: i64) -> Result<()> {
        self.api
            .delete(&format!("/files/{file_id}"), "Failed to delete file")
            .await?;
        info!(file_id = file_id, "file deleted");
        Ok(())
    }
}

/// MIME type for a supported document, by extension.
pub fn mime_for(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    SUPPORTED_TYPES
        .iter()
        .find(|(supported, _)| *supported == ext)
        .map(|(_, mime)| *mime)
        .ok_or_else(|| ClientError::UnsupportedFile {
            reason: format!(
                "{} is not a PDF or DOCX document",
                path.display()
            ),
        })
}

/// Human-readable size, e.g. `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for(Path::new("a.pdf")).unwrap(), "application/pdf");
        assert!(mime_for(Path::new("Report.DOCX")).unwrap().contains("wordprocessingml"));
        assert!(matches!(
            mime_for(Path::new("notes.txt")),
            Err(ClientError::UnsupportedFile { .. })
        ));
        assert!(mime_for(Path::new("no_extension")).is_err());
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(512), "512 Bytes");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5 MB");
    }

    #[test]
    fn file_item_from_backend_json() {
        let json = r#"{
            "id": 4,
            "original_filename": "report.pdf",
            "file_size": 2048,
            "file_type": "pdf",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z",
            "download_url": null
        }"#;
        let item: FileItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, 4);
        assert_eq!(item.original_filename, "report.pdf");
        assert_eq!(item.status, None);
    }
}
