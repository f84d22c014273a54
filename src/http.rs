//! HTTP 辅助工具：请求来源识别、公开链接拼接、CORS 与安全头。

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::{middleware, response::Response};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::config::UPLOADS_ROUTE_PREFIX;

/// 路径段中需要转义的字符。
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// 生成公开链接所用的协议与主机。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: &'static str,
    pub host: String,
}

impl RequestOrigin {
    /// 解析请求来源；仅在信任代理时读取 `x-forwarded-*` 头。
    pub fn from_headers(headers: &HeaderMap, trust_proxy: bool, fallback_host: &str) -> Self {
        let scheme = if trust_proxy
            && first_forwarded(headers, "x-forwarded-proto")
                .is_some_and(|value| value.eq_ignore_ascii_case("https"))
        {
            "https"
        } else {
            "http"
        };

        let host = trust_proxy
            .then(|| first_forwarded(headers, "x-forwarded-host"))
            .flatten()
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .filter(|value| !value.is_empty())
            })
            .unwrap_or(fallback_host)
            .to_string();

        Self { scheme, host }
    }

    /// `{scheme}://{host}/uploads/{key}`
    pub fn upload_url(&self, key: &str) -> String {
        format!(
            "{}://{}{}/{}",
            self.scheme,
            self.host,
            UPLOADS_ROUTE_PREFIX,
            utf8_percent_encode(key, PATH_SEGMENT)
        )
    }
}

/// 取逗号分隔的转发头中最靠近客户端的一项。
fn first_forwarded<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// 构建 CORS Layer（支持逗号分隔的来源列表）。
pub fn build_cors_layer(cors_origins: Option<&str>) -> Option<CorsLayer> {
    let origins = cors_origins?
        .split(',')
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "invalid cors origin");
                None
            }
        })
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// 添加基础安全响应头；上传内容不允许被嗅探成其他类型。
pub async fn add_security_headers(
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, StatusCode> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    Ok(response)
}
