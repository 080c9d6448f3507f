//! 部署相关领域模型

use axum::http::HeaderMap;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// 部署状态（仅用于已结束的部署记录）
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Success,
    Failed,
}

impl DeployStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
        }
    }
}

/// 步骤状态
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    TimedOut,
}

/// 单个步骤的执行结果
#[derive(Clone, Debug, Serialize)]
pub struct StepResult {
    /// 步骤标识 (fetch / stop / build / start)
    pub name: String,
    /// 退出码，超时或启动失败时为空
    pub exit_code: Option<i32>,
    /// 持续时间（毫秒）
    pub duration_ms: u64,
    pub status: StepStatus,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// 流水线步骤定义
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineStep {
    /// 步骤标识
    pub name: String,
    /// 要执行的程序
    pub program: String,
    /// 命令行参数
    pub args: Vec<String>,
    /// 工作目录
    pub work_dir: PathBuf,
    /// 失败时是否中止后续步骤
    pub abort_on_failure: bool,
}

impl PipelineStep {
    pub fn new(name: &str, program: &str, args: Vec<String>, work_dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args,
            work_dir,
            abort_on_failure: true,
        }
    }

    /// 用于日志展示的完整命令行
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// 解析后的推送事件
///
/// 每个请求创建一次，请求结束即丢弃
#[derive(Clone, Debug)]
pub struct DeploymentEvent {
    /// 推送的 ref (e.g. "refs/heads/main")
    pub reference: String,
    /// 推送后的提交哈希（payload 中的 `after`）
    pub commit: Option<String>,
    /// 投递 ID，仅用于日志关联
    pub delivery_id: Option<String>,
    /// 原始请求体（签名校验使用）
    pub raw_body: Bytes,
    pub headers: HeaderMap,
}

/// 一次部署尝试的结果
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentOutcome {
    pub deployment_id: String,
    pub triggered: bool,
    /// 已执行步骤（按执行顺序）
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// 失败步骤的 stderr 尾部（已截断、已脱敏）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
}

impl DeploymentOutcome {
    pub fn new(deployment_id: String) -> Self {
        Self {
            deployment_id,
            triggered: true,
            steps: Vec::new(),
            failed_step: None,
            failure_reason: None,
            stderr_tail: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_step.is_none()
    }

    /// 失败步骤的退出码
    pub fn failed_exit_code(&self) -> Option<i32> {
        let failed = self.failed_step.as_deref()?;
        self.steps
            .iter()
            .find(|s| s.name == failed)
            .and_then(|s| s.exit_code)
    }
}

/// 部署历史记录
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub reference: String,
    pub commit: Option<String>,
    pub status: DeployStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl DeploymentRecord {
    /// 从部署结果生成记录（不保留 stderr）
    pub fn from_outcome(
        event: &DeploymentEvent,
        outcome: &DeploymentOutcome,
        started_at: DateTime<Utc>,
    ) -> Self {
        let status = if outcome.is_success() {
            DeployStatus::Success
        } else {
            DeployStatus::Failed
        };
        Self {
            id: outcome.deployment_id.clone(),
            reference: event.reference.clone(),
            commit: event.commit.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            steps: outcome.steps.clone(),
            failure_reason: outcome.failure_reason.clone(),
        }
    }
}
