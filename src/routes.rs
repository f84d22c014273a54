//! 路由装配：落地页、上传与已上传文件读取。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::config::UPLOADS_ROUTE_PREFIX;
use crate::http::{add_security_headers, build_cors_layer};
use crate::state::ShareContext;
use crate::{files, frontend, upload};

/// 构建完整路由。
pub fn build_router(context: &ShareContext, cors_origins: Option<&str>) -> Router {
    let body_limit = if context.upload_max_size == 0 {
        DefaultBodyLimit::disable()
    } else {
        DefaultBodyLimit::max(usize::try_from(context.upload_max_size).unwrap_or(usize::MAX))
    };

    let mut app = Router::new()
        .route("/", get(frontend::serve_landing))
        .route("/upload", post(upload::upload_file).layer(body_limit))
        .route(
            &format!("{UPLOADS_ROUTE_PREFIX}/{{filename}}"),
            get(files::serve_upload),
        )
        .fallback(frontend::not_found)
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip().to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(context.storage.clone()))
        .layer(Extension(context.records.clone()))
        .layer(Extension(context.upload.clone()));

    if let Some(cors_layer) = build_cors_layer(cors_origins) {
        app = app.layer(cors_layer);
    }
    app
}
