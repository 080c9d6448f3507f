//! 统一错误处理
//!
//! 提供 `ApiError` 枚举实现 `IntoResponse`，把各类失败映射到 HTTP 响应；
//! 以及启动阶段使用的 `AgentError`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::deploy::{DeploymentOutcome, StepResult};
use crate::services::filter::FilterError;

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// 步骤失败响应
#[derive(Debug, Serialize)]
pub struct StepFailedResponse {
    pub error: &'static str,
    pub message: String,
    pub triggered: bool,
    pub deployment_id: String,
    pub failed_step: Option<String>,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub steps: Vec<StepResult>,
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 401 - 签名无效或缺失
    Unauthorized,
    /// 400 - 请求无效（MalformedPayload / MissingRef）
    BadRequest { code: &'static str, message: String },
    /// 409 - 已有部署在进行
    DeploymentInProgress(String),
    /// 500 - 某个部署步骤失败
    StepFailed(Box<DeploymentOutcome>),
    /// 500 - 内部错误
    Internal(String),
}

impl ApiError {
    /// 创建未授权错误
    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    /// 创建请求无效错误
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    /// 创建部署冲突错误
    pub fn in_progress(message: impl Into<String>) -> Self {
        Self::DeploymentInProgress(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::DeploymentInProgress(_) => StatusCode::CONFLICT,
            ApiError::StepFailed(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::bad_request(err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Unauthorized => (
                status,
                Json(ErrorResponse::new(
                    "Unauthorized",
                    "Invalid or missing signature",
                )),
            )
                .into_response(),
            ApiError::BadRequest { code, message } => {
                (status, Json(ErrorResponse::new(code, message))).into_response()
            }
            ApiError::DeploymentInProgress(msg) => {
                (status, Json(ErrorResponse::new("DeploymentInProgress", msg))).into_response()
            }
            ApiError::StepFailed(outcome) => {
                let outcome = *outcome;
                let exit_code = outcome.failed_exit_code();
                let body = StepFailedResponse {
                    error: "StepFailed",
                    message: outcome
                        .failure_reason
                        .unwrap_or_else(|| "deployment step failed".to_string()),
                    triggered: outcome.triggered,
                    deployment_id: outcome.deployment_id,
                    failed_step: outcome.failed_step,
                    exit_code,
                    stderr: outcome.stderr_tail,
                    steps: outcome.steps,
                };
                (status, Json(body)).into_response()
            }
            ApiError::Internal(msg) => {
                (status, Json(ErrorResponse::new("InternalError", msg))).into_response()
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::BadRequest { code, message } => write!(f, "{}: {}", code, message),
            ApiError::DeploymentInProgress(m) => write!(f, "Deployment in progress: {}", m),
            ApiError::StepFailed(o) => write!(
                f,
                "Step failed: {}",
                o.failure_reason.as_deref().unwrap_or("unknown")
            ),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;

/// 启动 / 运行阶段错误
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
