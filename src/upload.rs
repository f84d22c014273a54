//! 上传处理：写入 blob、签发令牌、记录元数据、返回分享链接。

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::atomic::AtomicFile;
use crate::config::UPLOAD_FIELD_NAME;
use crate::error::ApiError;
use crate::http::RequestOrigin;
use crate::records::{PersistenceError, RecordStore, UploadRecord};
use crate::storage::{IncomingFile, KeyStrategy, Storage, StorageError};
use crate::token::generate_token;

pub const NO_FILE_MESSAGE: &str = "No file uploaded.";
const MULTIPLE_FILES_MESSAGE: &str = "Multiple file fields are not allowed.";

#[derive(Debug)]
pub struct UploadConfig {
    pub key_strategy: KeyStrategy,
    pub trust_proxy: bool,
    /// 请求缺少 Host 头时用于拼接链接。
    pub fallback_host: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("blob write failed: {0}")]
    Storage(#[from] StorageError),
    #[error("record write failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::Validation(msg) => ApiError::BadRequest(msg.into()),
            UploadError::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::PayloadTooLarge(err.body_text())
            }
            UploadError::Multipart(err) => ApiError::BadRequest(err.body_text()),
            UploadError::Storage(StorageError::InvalidKey) => {
                ApiError::BadRequest("invalid filename".into())
            }
            UploadError::Storage(_) | UploadError::Persistence(_) => {
                ApiError::Internal("Internal Server Error".into())
            }
        }
    }
}

/// POST /upload：接收名为 `file` 的单个文件字段。
pub async fn upload_file(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(records): Extension<Arc<dyn RecordStore>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, ApiError> {
    let origin = RequestOrigin::from_headers(&headers, upload.trust_proxy, &upload.fallback_host);
    match receive_upload(&storage, records.as_ref(), &upload, &origin, multipart).await {
        Ok(record) => Ok(format!(
            "File uploaded successfully! Download link: {}",
            record.download_link()
        )),
        Err(err) => {
            match &err {
                UploadError::Validation(_)
                | UploadError::Multipart(_)
                | UploadError::Storage(StorageError::InvalidKey) => {
                    warn!(error = %err, "upload rejected")
                }
                UploadError::Storage(_) | UploadError::Persistence(_) => {
                    error!(error = %err, "error uploading file")
                }
            }
            Err(err.into())
        }
    }
}

/// 整个请求体读完且校验通过后才提交 blob，再生成令牌并写记录。
/// 记录写入失败时 blob 保留。
async fn receive_upload(
    storage: &Storage,
    records: &dyn RecordStore,
    config: &UploadConfig,
    origin: &RequestOrigin,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadRecord, UploadError> {
    let mut multipart = multipart.map_err(|_| UploadError::Validation(NO_FILE_MESSAGE))?;

    let mut pending: Option<PendingBlob> = None;
    if let Err(err) = read_file_part(&mut multipart, storage, config, &mut pending).await {
        if let Some(PendingBlob { blob, .. }) = pending {
            blob.cleanup().await;
        }
        return Err(err);
    }

    let Some(PendingBlob {
        incoming,
        key,
        blob,
    }) = pending
    else {
        return Err(UploadError::Validation(NO_FILE_MESSAGE));
    };
    let size = blob.finalize().await?;
    info!(
        key,
        original_name = incoming.original_name,
        content_type = incoming.content_type.as_deref().unwrap_or("unknown"),
        size,
        "blob stored"
    );

    let record = UploadRecord {
        filename: incoming.original_name,
        url: origin.upload_url(&key),
        token: generate_token(),
        created_at: Utc::now(),
    };
    info!(url = record.url, "file url");
    records.insert(&record).await?;
    Ok(record)
}

/// 已写入临时文件、尚未替换目标的上传。
struct PendingBlob {
    incoming: IncomingFile,
    key: String,
    blob: AtomicFile,
}

/// 读取全部字段，把唯一的 `file` 字段写入 `pending`。出错时由调用方清理。
async fn read_file_part(
    multipart: &mut Multipart,
    storage: &Storage,
    config: &UploadConfig,
    pending: &mut Option<PendingBlob>,
) -> Result<(), UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            continue;
        }
        // 浏览器未选择文件时会提交空文件名
        let Some(original_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            continue;
        };
        if pending.is_some() {
            return Err(UploadError::Validation(MULTIPLE_FILES_MESSAGE));
        }

        let incoming = IncomingFile {
            original_name,
            content_type: field.content_type().map(str::to_string),
        };
        let key = (config.key_strategy)(&incoming);
        let blob = storage.create_blob(&key).await?;
        let PendingBlob { blob, .. } = pending.insert(PendingBlob {
            incoming,
            key,
            blob,
        });
        while let Some(chunk) = field.chunk().await? {
            blob.write_chunk(&chunk).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn validation_errors_are_bad_requests() {
        let response = ApiError::from(UploadError::Validation(NO_FILE_MESSAGE)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failures_hide_details() {
        let err = UploadError::Persistence(PersistenceError::Unavailable("db down".into()));
        match ApiError::from(err) {
            ApiError::Internal(msg) => assert_eq!(msg, "Internal Server Error"),
            other => panic!("unexpected {other:?}"),
        }
        let err = UploadError::Storage(StorageError::Io(std::io::Error::other("disk full")));
        assert!(matches!(ApiError::from(err), ApiError::Internal(_)));
    }

    #[test]
    fn unusable_key_is_a_bad_request() {
        let err = UploadError::Storage(StorageError::InvalidKey);
        assert!(matches!(ApiError::from(err), ApiError::BadRequest(_)));
    }
}
