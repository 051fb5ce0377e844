//! Thin Google Drive v3 REST client.
//!
//! One client is built per process run, bound to the credential the
//! lifecycle manager returned. Queries are single-page by design; listings
//! larger than the service's default page size truncate.

use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

use drivecli_common::{Error, Result};

use crate::auth::Credential;

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Folder marker in Drive metadata.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Chunk size for resumable uploads (must be a multiple of 256 KiB).
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Field projection requested for every query.
const QUERY_FIELDS: &str = "files(id,name,mimeType,modifiedTime)";

/// A file or folder inside the storage service.
///
/// Identifiers are always service-assigned, obtained from a query or create
/// response, and used for exactly one operation before being discarded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteObject {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    files: Vec<RemoteObject>,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

/// Google Drive API client.
pub struct DriveClient {
    http: Client,
    access_token: String,
}

impl DriveClient {
    /// Create a client bound to an authenticated credential.
    pub fn new(credential: &Credential) -> Result<Self> {
        let http = Client::builder()
            .user_agent("drivecli/0.1")
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            access_token: credential.access_token.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Run a metadata query and return the first (only) page of matches.
    pub async fn query(&self, q: &str) -> Result<Vec<RemoteObject>> {
        debug!(query = q, "querying drive");
        let url = format!("{}/files", DRIVE_API_BASE);

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .query(&[("q", q), ("fields", QUERY_FIELDS)])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("File query failed: {}", e)))?;

        let listing: QueryResponse = handle_response(response).await?;
        Ok(listing.files)
    }

    /// Create a folder and return its identifier.
    ///
    /// No parent is attached; the service places the folder under root.
    pub async fn create_folder(&self, name: &str) -> Result<String> {
        let url = format!("{}/files", DRIVE_API_BASE);
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Folder creation failed: {}", e)))?;

        let created: CreatedObject = handle_response(response).await?;
        Ok(created.id)
    }

    /// Upload a local file with the resumable protocol and return the new
    /// object's identifier.
    pub async fn upload_file(
        &self,
        source: &Path,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        let total_size = tokio::fs::metadata(source).await?.len();
        let content_type = mime_guess::from_path(source).first_or_octet_stream();

        let session_url = self
            .start_resumable_upload(name, parent_id, total_size, content_type.essence_str())
            .await?;

        // Zero-length media still needs one finalizing request.
        if total_size == 0 {
            let done = self.upload_chunk(&session_url, &[], 0, 0).await?;
            return done.ok_or_else(|| {
                Error::Transport("Upload did not complete".to_string())
            });
        }

        let mut file = tokio::fs::File::open(source).await?;
        let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
        let mut offset: u64 = 0;

        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }

            let done = self
                .upload_chunk(&session_url, &buf[..read], offset, total_size)
                .await?;
            offset += read as u64;

            if let Some(id) = done {
                return Ok(id);
            }
        }

        Err(Error::Transport("Upload did not complete".to_string()))
    }

    /// Start a resumable upload session and return the session URI.
    async fn start_resumable_upload(
        &self,
        name: &str,
        parent_id: Option<&str>,
        total_size: u64,
        content_type: &str,
    ) -> Result<String> {
        let url = format!("{}/files?uploadType=resumable", DRIVE_UPLOAD_BASE);

        let mut metadata = serde_json::json!({ "name": name });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", total_size.to_string())
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to start resumable upload: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "Failed to start resumable upload: {} - {}",
                status, body
            )));
        }

        let session_url = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| Error::Transport("No upload session URI in response".to_string()))?
            .to_str()
            .map_err(|e| Error::Transport(format!("Invalid upload session URI: {}", e)))?
            .to_string();

        Ok(session_url)
    }

    /// Upload one chunk. Returns the file id once the service reports the
    /// upload complete, `None` while more chunks are expected.
    async fn upload_chunk(
        &self,
        session_url: &str,
        data: &[u8],
        start: u64,
        total: u64,
    ) -> Result<Option<String>> {
        let response = self
            .http
            .put(session_url)
            .header(header::CONTENT_LENGTH, data.len().to_string())
            .header(header::CONTENT_RANGE, content_range(start, data.len(), total))
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Chunk upload failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            let uploaded: CreatedObject = response
                .json()
                .await
                .map_err(|e| Error::Transport(format!("Failed to parse upload response: {}", e)))?;
            Ok(Some(uploaded.id))
        } else if status.as_u16() == 308 {
            // 308 Resume Incomplete: more chunks expected.
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Transport(format!(
                "Chunk upload failed: {} - {}",
                status, body
            )))
        }
    }

    /// Open a file's media content as a byte stream.
    pub async fn download_stream(&self, file_id: &str) -> Result<reqwest::Response> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, file_id);

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Download failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "Download failed: {} - {}",
                status, body
            )));
        }

        Ok(response)
    }

    /// Delete a file by identifier.
    pub async fn delete(&self, file_id: &str) -> Result<()> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, file_id);

        let response = self
            .http
            .delete(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Delete failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Transport(format!(
                "Delete failed: {} - {}",
                status, body
            )))
        }
    }
}

/// Build the Content-Range header value for a resumable chunk.
fn content_range(start: u64, len: usize, total: u64) -> String {
    if len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", start, start + len as u64 - 1, total)
    }
}

/// Map an API response to a deserialized body or an error class.
async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Failed to parse response: {}", e)))
    } else if status == StatusCode::UNAUTHORIZED {
        Err(Error::Auth("Invalid or expired access token".to_string()))
    } else if status == StatusCode::NOT_FOUND {
        Err(Error::NotFound("Resource not found".to_string()))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(Error::Transport(format!(
            "API error: {} - {}",
            status, body
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_object_is_folder() {
        let folder = RemoteObject {
            id: "1".to_string(),
            name: "docs".to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            modified_time: None,
        };
        assert!(folder.is_folder());

        let file = RemoteObject {
            id: "2".to_string(),
            name: "file.txt".to_string(),
            mime_type: "text/plain".to_string(),
            modified_time: None,
        };
        assert!(!file.is_folder());
    }

    #[test]
    fn test_remote_object_deserializes_camel_case() {
        let json = r#"{
            "id": "abc123",
            "name": "report.pdf",
            "mimeType": "application/pdf",
            "modifiedTime": "2024-05-01T10:30:00Z"
        }"#;

        let object: RemoteObject = serde_json::from_str(json).unwrap();
        assert_eq!(object.id, "abc123");
        assert_eq!(object.mime_type, "application/pdf");
        assert!(object.modified_time.is_some());
    }

    #[test]
    fn test_query_response_tolerates_empty_listing() {
        let listing: QueryResponse = serde_json::from_str("{}").unwrap();
        assert!(listing.files.is_empty());
    }

    #[test]
    fn test_content_range_for_chunks() {
        assert_eq!(content_range(0, 256 * 1024, 1_000_000), "bytes 0-262143/1000000");
        assert_eq!(content_range(262_144, 100, 262_244), "bytes 262144-262243/262244");
    }

    #[test]
    fn test_content_range_for_empty_media() {
        assert_eq!(content_range(0, 0, 0), "bytes */0");
    }
}
