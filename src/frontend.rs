//! 内嵌的上传落地页。

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

use crate::error::ApiError;

#[derive(RustEmbed)]
#[folder = "static"]
/// 编译进二进制的静态页面。
pub struct LandingAssets;

/// GET /：返回上传表单页面。
pub async fn serve_landing() -> Result<Response, ApiError> {
    let asset = LandingAssets::get("index.html")
        .ok_or_else(|| ApiError::Internal("landing page missing from build".into()))?;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Ok((headers, AxumBody::from(asset.data.into_owned())).into_response())
}

/// 未匹配路由的回退处理器。
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".into())
}
