//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod deploy;
pub mod health;

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::state::AppState;

/// 推送事件请求体上限（与托管平台的 payload 上限一致）
const MAX_WEBHOOK_BODY_BYTES: usize = 25 * 1024 * 1024;

/// 构建完整的 API 路由
pub fn router(state: Arc<AppState>) -> Router {
    let webhook_path = state.config.webhook_path.clone();

    Router::new()
        // Health & Status
        .merge(health::router())
        // Webhook & history
        .merge(deploy::router(&webhook_path))
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
