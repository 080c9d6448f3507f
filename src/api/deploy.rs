//! 部署触发 API
//!
//! 包含 webhook 入口（路径可配置）和 /deployments/recent 端点

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::deploy::{DeploymentOutcome, DeploymentRecord, StepResult};
use crate::error::{ApiError, ApiResult};
use crate::middleware::SignedRequest;
use crate::services;
use crate::services::filter::{self, FilterDecision, IgnoreReason};
use crate::state::AppState;

/// 触发响应（部署成功或被忽略）
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IgnoreReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,
}

impl TriggerResponse {
    fn ignored(reason: IgnoreReason, reference: Option<String>) -> Self {
        Self {
            triggered: false,
            reason: Some(reason),
            reference,
            deployment_id: None,
            steps: Vec::new(),
        }
    }

    fn deployed(outcome: DeploymentOutcome) -> Self {
        Self {
            triggered: true,
            reason: None,
            reference: None,
            deployment_id: Some(outcome.deployment_id),
            steps: outcome.steps,
        }
    }
}

/// 部署历史查询参数
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// 返回数量限制，默认 20
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// 部署历史响应
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub deployments: Vec<DeploymentRecord>,
    pub total: usize,
}

/// 创建部署路由
pub fn router(webhook_path: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(webhook_path, post(receive_webhook))
        .route("/deployments/recent", get(recent_deployments))
}

/// 接收推送 webhook
///
/// POST <webhook_path>
/// 签名校验 → 事件过滤 → 获取部署锁 → 执行流水线
///
/// 流水线在独立任务中运行并持有部署锁：客户端断开不会中断部署，
/// 任务 panic 时锁也会随之释放
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    signed: SignedRequest,
) -> ApiResult<Json<TriggerResponse>> {
    let decision = filter::evaluate(signed.body, signed.headers, &state.config.target_ref)
        .map_err(|e| {
            warn!(error = %e, "Rejected webhook payload");
            ApiError::from(e)
        })?;

    let event = match decision {
        FilterDecision::Deploy(event) => event,
        FilterDecision::Ignore { reason, reference } => {
            info!(
                reason = reason.as_str(),
                reference = ?reference,
                target_ref = %state.config.target_ref,
                "Webhook ignored"
            );
            return Ok(Json(TriggerResponse::ignored(reason, reference)));
        }
    };

    let deployment_id = uuid::Uuid::new_v4().to_string();
    let Some(guard) = state.deploy_lock.try_acquire(&deployment_id, &event.reference) else {
        let running = state
            .deploy_lock
            .current()
            .map(|d| d.deployment_id)
            .unwrap_or_default();
        warn!(
            running_deployment = %running,
            reference = %event.reference,
            "Rejected trigger: deployment already in progress"
        );
        return Err(ApiError::in_progress(format!(
            "Deployment {} is already running; retry later",
            running
        )));
    };

    let task = tokio::spawn(services::deploy::execute(state.clone(), event, guard));
    let outcome = task.await.map_err(|e| {
        error!(deployment_id = %deployment_id, error = %e, "Deployment task aborted unexpectedly");
        ApiError::internal("Deployment task aborted unexpectedly")
    })?;

    if outcome.is_success() {
        Ok(Json(TriggerResponse::deployed(outcome)))
    } else {
        Err(ApiError::StepFailed(Box::new(outcome)))
    }
}

/// 获取最近的部署记录
///
/// GET /deployments/recent
/// 无需认证（记录中不包含 stderr）
async fn recent_deployments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let deployments = state.history.recent(query.limit).await;
    let total = deployments.len();
    Json(HistoryResponse { deployments, total })
}
