//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::EnvConfig;
use crate::infra::{ProcessRunner, StepRunner};
use crate::services::deploy::Executor;

use super::deploy_lock::DeployLock;
use super::history::DeploymentHistory;

/// 全局 shutdown token，用于优雅关闭
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN.get_or_init(CancellationToken::new).clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

/// 应用状态
pub struct AppState {
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 部署锁（唯一的串行化点）
    pub deploy_lock: DeployLock,
    /// 部署执行器
    pub executor: Executor,
    /// 部署历史
    pub history: DeploymentHistory,
}

impl AppState {
    /// 创建新的应用状态（真实进程执行器）
    pub fn new(config: EnvConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    /// 使用指定的步骤执行器创建
    pub fn with_runner(config: EnvConfig, runner: Arc<dyn StepRunner>) -> Self {
        let executor = Executor::from_config(&config, runner);

        tracing::info!(
            port = config.port,
            target_ref = %config.target_ref,
            webhook_path = %config.webhook_path,
            work_dir = %config.work_dir.display(),
            compose_file = %config.compose_file,
            step_timeout_ms = config.step_timeout.as_millis() as u64,
            signature_verification = !config.skips_verification(),
            "Loaded configuration"
        );

        for step in executor.steps() {
            tracing::info!(step = %step.name, command = %step.command_line(), "Registered pipeline step");
        }

        Self {
            config,
            started_at: Utc::now(),
            deploy_lock: DeployLock::new(),
            executor,
            history: DeploymentHistory::new(),
        }
    }

    /// 运行时长（秒）
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
