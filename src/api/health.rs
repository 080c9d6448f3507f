//! 健康检查 API
//!
//! GET /health, GET /status

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::domain::deploy::DeploymentRecord;
use crate::state::AppState;

/// 运行中的部署摘要
#[derive(Debug, Serialize)]
struct RunningSummary {
    deployment_id: String,
    reference: String,
    started_at: String,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
    uptime_secs: i64,
    target_ref: String,
    signature_verification: bool,
    deploying: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    running: Option<RunningSummary>,
    last_deployment: Option<DeploymentRecord>,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(health_check))
}

/// 健康检查 - 返回状态、版本、运行时间、部署状态
///
/// GET /health, GET /status
/// 无需认证
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let running = state.deploy_lock.current().map(|d| RunningSummary {
        deployment_id: d.deployment_id,
        reference: d.reference,
        started_at: d.started_at.to_rfc3339(),
    });

    Json(HealthResponse {
        status: "healthy",
        service: "deploy-hook-agent",
        version: VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: state.uptime_secs(),
        target_ref: state.config.target_ref.clone(),
        signature_verification: !state.config.skips_verification(),
        deploying: running.is_some(),
        running,
        last_deployment: state.history.last().await,
    })
}
