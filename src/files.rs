//! 已上传文件的静态读取。
//!
//! `?token=` 只是链接的一部分，这里不做校验：知道文件名即可下载。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path, RawQuery};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::fmt_http_date;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified};
use crate::storage::{Storage, StorageError, StoredBlob};

/// GET /uploads/{filename}：返回 blob 内容，支持 Range 与条件请求。
pub async fn serve_upload(
    Path(filename): Path<String>,
    RawQuery(query): RawQuery,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let StoredBlob { file, metadata } = storage
        .open_blob(&filename)
        .await
        .map_err(|err| match err {
            StorageError::InvalidKey => ApiError::NotFound("Not Found".into()),
            other => other.into(),
        })?;
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);
    let mime = mime_guess::from_path(&filename).first_or_octet_stream();
    debug!(
        filename,
        token_present = has_token(query.as_deref()),
        "serve upload"
    );

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.as_ref())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::ETAG, header_value(&etag)?);
    if let Some(value) = modified.map(fmt_http_date) {
        response_headers.insert(header::LAST_MODIFIED, header_value(&value)?);
    }

    if is_not_modified(&request_headers, &etag, modified) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    if let Some((start, end)) = parse_range(request_headers.get(header::RANGE), file_size)? {
        let length = end - start + 1;
        debug!(filename, start, end, length, "range request accepted");
        let mut file = file;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        response_headers.insert(
            header::CONTENT_RANGE,
            header_value(&format!("bytes {start}-{end}/{file_size}"))?,
        );
        response_headers.insert(header::CONTENT_LENGTH, header_value(&length.to_string())?);
        let stream = ReaderStream::new(file.take(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, header_value(&file_size.to_string())?);
    info!(filename, size = file_size, "serve upload");
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|_| ApiError::Internal("invalid response header".into()))
}

fn has_token(query: Option<&str>) -> bool {
    query.is_some_and(|query| {
        query
            .split('&')
            .any(|pair| pair == "token" || pair.starts_with("token="))
    })
}

/// 解析单段 `Range: bytes=` 头；格式不支持时忽略并返回完整内容。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(range) = value
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
    else {
        return Ok(None);
    };
    if range.contains(',') {
        return Ok(None);
    }
    let Some((start_part, end_part)) = range.split_once('-') else {
        return Ok(None);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    let (start, end) = if start_part.is_empty() {
        let Ok(suffix) = end_part.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || file_size == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let Ok(start) = start_part.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end_part.is_empty() {
            file_size.saturating_sub(1)
        } else {
            match end_part.parse::<u64>() {
                Ok(end) => end.min(file_size.saturating_sub(1)),
                Err(_) => return Ok(None),
            }
        };
        (start, end)
    };

    if start >= file_size || start > end {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    Ok(Some((start, end)))
}
