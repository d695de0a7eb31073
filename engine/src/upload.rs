//! Uploads local files into the platform's temporary storage so they can be
//! used as task inputs.
//!
//! Two steps: fetch a pre-signed upload policy for the target model, then POST
//! the file as multipart form straight to the storage host. The result is an
//! `oss://` URL, valid for 48 hours, which requests may reference in place of
//! an http URL.
//!
//! Files kept on the platform can also be listed, inspected and deleted.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::{info, warn};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::{Connection, Error, Result, error::ensure_arg, error::TransportError, media};

pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const UPLOAD_VALIDITY: Duration = Duration::from_secs(48 * 60 * 60);
pub const DEFAULT_MODEL: &str = "qwen-vl-plus";
pub const DEFAULT_LIST_LIMIT: u32 = 20;
const UPLOADS_PATH: &str = "uploads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub oss_url: String,
    pub file: FileInfo,
    pub validity: Duration,
}

/// Credentials for one direct upload to the storage host
#[derive(Debug, Clone, Deserialize)]
pub struct UploadPolicy {
    pub policy: String,
    pub signature: String,
    pub upload_dir: String,
    pub upload_host: String,
    pub expire_in_seconds: Option<u64>,
    pub max_file_size_mb: Option<u64>,
    pub oss_access_key_id: String,
    pub x_oss_object_acl: String,
    pub x_oss_forbid_overwrite: String,
}

#[derive(Debug, Deserialize)]
struct PolicyResponse {
    data: Option<UploadPolicy>,
}

/// A file the platform keeps for this account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    #[serde(alias = "id")]
    pub file_id: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub purpose: Option<String>,
    pub url: Option<String>,
    #[serde(alias = "gmt_create")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    pub total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: Option<T>,
}

impl<T> DataResponse<T> {
    fn into_data(self, what: &str) -> Result<T> {
        self.data
            .ok_or_else(|| Error::MalformedResponse(format!("no data in {what} response")))
    }
}

pub fn mime_type(extension: &str) -> Option<&'static str> {
    Some(match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    })
}

/// Checks that `path` is an uploadable file without reading it.
pub async fn inspect(path: &Path) -> Result<FileInfo> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::InvalidArgument(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    ensure_arg!(meta.is_file(), "{} is not a file", path.display());
    ensure_arg!(
        meta.len() <= MAX_FILE_SIZE,
        "{} is {} bytes, at most {MAX_FILE_SIZE} are allowed",
        path.display(),
        meta.len()
    );

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(mime_type) = mime_type(&extension) else {
        return Err(Error::InvalidArgument(format!(
            "unsupported file type {extension:?} for {}",
            path.display()
        )));
    };

    Ok(FileInfo {
        path: path.to_path_buf(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: meta.len(),
        mime_type,
    })
}

pub async fn get_policy(conn: &Connection, model: &str) -> Result<UploadPolicy> {
    let request = conn
        .get(UPLOADS_PATH)
        .query(&[("action", "getPolicy"), ("model", model)]);
    conn.send_json::<PolicyResponse>(request)
        .await?
        .data
        .ok_or_else(|| Error::MalformedResponse("no data in upload policy response".into()))
}

/// Posts the file to the storage host named by `policy` and returns its `oss://` URL.
pub async fn post_to_storage(
    http: &reqwest::Client,
    policy: &UploadPolicy,
    file: &FileInfo,
) -> Result<String> {
    let key = format!("{}/{}", policy.upload_dir, file.name);
    let data = tokio::fs::read(&file.path).await?;
    let part = Part::bytes(data)
        .file_name(file.name.clone())
        .mime_str(file.mime_type)?;

    // the file has to be the last field, the storage host ignores anything after it
    let form = Form::new()
        .text("OSSAccessKeyId", policy.oss_access_key_id.clone())
        .text("Signature", policy.signature.clone())
        .text("policy", policy.policy.clone())
        .text("x-oss-object-acl", policy.x_oss_object_acl.clone())
        .text("x-oss-forbid-overwrite", policy.x_oss_forbid_overwrite.clone())
        .text("key", key.clone())
        .text("success_action_status", "200")
        .part("file", part);

    let resp = http
        .post(&policy.upload_host)
        .multipart(form)
        .timeout(media::TRANSFER_TIMEOUT)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::from_response(status, &body).into());
    }
    Ok(format!("oss://{key}"))
}

/// Uploads one file for use with `model`.
pub async fn upload(conn: &Connection, path: &Path, model: &str) -> Result<UploadedFile> {
    let file = inspect(path).await?;
    info!(
        "Uploading {} ({} bytes, {})",
        file.name, file.size, file.mime_type
    );

    let policy = get_policy(conn, model).await?;
    if let Some(max_mb) = policy.max_file_size_mb {
        ensure_arg!(
            file.size <= max_mb.saturating_mul(1024 * 1024),
            "{} is larger than the {max_mb} MB the upload policy allows",
            file.name
        );
    }

    let oss_url = post_to_storage(conn.http(), &policy, &file).await?;
    info!("Uploaded {} to {oss_url}", file.name);
    Ok(UploadedFile {
        oss_url,
        file,
        validity: UPLOAD_VALIDITY,
    })
}

/// Uploads files one after another. A failed file doesn't stop the rest.
pub async fn upload_many(
    conn: &Connection,
    paths: &[PathBuf],
    model: &str,
) -> Vec<(PathBuf, Result<UploadedFile>)> {
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let result = upload(conn, path, model).await;
        if let Err(e) = &result {
            warn!("Upload of {} failed: {e}", path.display());
        }
        results.push((path.clone(), result));
    }
    results
}

pub async fn get_file_info(conn: &Connection, file_id: &str) -> Result<RemoteFile> {
    ensure_arg!(!file_id.trim().is_empty(), "file id must not be empty");
    conn.send_json::<DataResponse<RemoteFile>>(conn.get(&format!("{UPLOADS_PATH}/{file_id}")))
        .await?
        .into_data("file info")
}

/// Lists uploaded files, newest first, optionally only those for `purpose`.
pub async fn list_files(conn: &Connection, purpose: Option<&str>, limit: u32) -> Result<FileList> {
    ensure_arg!(limit > 0, "limit must be greater than zero");
    let mut request = conn.get(UPLOADS_PATH).query(&[("limit", limit)]);
    if let Some(purpose) = purpose {
        request = request.query(&[("purpose", purpose)]);
    }
    conn.send_json::<DataResponse<FileList>>(request)
        .await?
        .into_data("file list")
}

pub async fn delete_file(conn: &Connection, file_id: &str) -> Result<()> {
    ensure_arg!(!file_id.trim().is_empty(), "file id must not be empty");
    let resp = conn
        .delete(&format!("{UPLOADS_PATH}/{file_id}"))
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::from_response(status, &body).into());
    }
    info!("Deleted file {file_id}");
    Ok(())
}
