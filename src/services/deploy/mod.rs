//! 部署服务模块
//!
//! 按固定顺序执行流水线步骤，任何一步失败即停止（不回滚、不重试）

pub mod pipeline;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::EnvConfig;
use crate::domain::deploy::{
    DeploymentEvent, DeploymentOutcome, DeploymentRecord, PipelineStep, StepResult, StepStatus,
};
use crate::infra::command::{StepExecution, StepRunner};
use crate::state::{AppState, DeployGuard};

pub use pipeline::default_steps;

/// 部署执行器
///
/// 持有步骤列表和步骤执行器，单个解释循环按顺序执行
pub struct Executor {
    steps: Vec<PipelineStep>,
    runner: Arc<dyn StepRunner>,
    step_timeout: Duration,
    stderr_limit: usize,
    /// 用于 stderr 脱敏
    secret: Option<String>,
}

impl Executor {
    pub fn new(
        steps: Vec<PipelineStep>,
        runner: Arc<dyn StepRunner>,
        step_timeout: Duration,
        stderr_limit: usize,
    ) -> Self {
        Self {
            steps,
            runner,
            step_timeout,
            stderr_limit,
            secret: None,
        }
    }

    /// 使用默认流水线创建
    pub fn from_config(config: &EnvConfig, runner: Arc<dyn StepRunner>) -> Self {
        let mut executor = Self::new(
            default_steps(config),
            runner,
            config.step_timeout,
            config.stderr_tail_bytes,
        );
        executor.secret = config.secret.clone();
        executor
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// 执行全部步骤
    ///
    /// 调用方必须持有部署锁
    pub async fn run(&self, deployment_id: &str) -> DeploymentOutcome {
        let mut outcome = DeploymentOutcome::new(deployment_id.to_string());
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            info!(
                deployment_id = %deployment_id,
                step = %step.name,
                command = %step.command_line(),
                "[{}/{}] Running step",
                index + 1,
                total
            );

            let started = Instant::now();
            let result = self
                .runner
                .run(step, self.step_timeout, self.stderr_limit)
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (status, exit_code, failure) = match result {
                Ok(exec) if exec.success() => (StepStatus::Success, exec.exit_code, None),
                Ok(exec) if exec.timed_out => {
                    let reason = format!(
                        "step '{}' timed out after {}ms",
                        step.name,
                        self.step_timeout.as_millis()
                    );
                    (StepStatus::TimedOut, None, Some((reason, exec.stderr_tail)))
                }
                Ok(StepExecution {
                    exit_code,
                    stderr_tail,
                    ..
                }) => {
                    let reason = match exit_code {
                        Some(code) => format!("step '{}' exited with code {}", step.name, code),
                        None => format!("step '{}' was terminated by a signal", step.name),
                    };
                    (StepStatus::Failed, exit_code, Some((reason, stderr_tail)))
                }
                Err(e) => {
                    let reason = format!("step '{}' could not be started: {}", step.name, e);
                    (StepStatus::Failed, None, Some((reason, String::new())))
                }
            };

            outcome.steps.push(StepResult {
                name: step.name.clone(),
                exit_code,
                duration_ms,
                status,
            });

            let Some((reason, stderr_tail)) = failure else {
                info!(
                    deployment_id = %deployment_id,
                    step = %step.name,
                    duration_ms = duration_ms,
                    "Step finished"
                );
                continue;
            };

            if !step.abort_on_failure {
                warn!(
                    deployment_id = %deployment_id,
                    step = %step.name,
                    "{}, continuing",
                    reason
                );
                continue;
            }

            error!(
                deployment_id = %deployment_id,
                step = %step.name,
                exit_code = ?exit_code,
                "{}; remaining steps skipped",
                reason
            );
            outcome.failed_step = Some(step.name.clone());
            outcome.failure_reason = Some(reason);
            if !stderr_tail.is_empty() {
                outcome.stderr_tail = Some(redact(&stderr_tail, self.secret.as_deref()));
            }
            break;
        }

        outcome
    }
}

/// 执行一次部署并写入历史
///
/// 接管部署锁，函数返回时（或任务 panic 时）锁随 guard 一起释放
pub async fn execute(
    state: Arc<AppState>,
    event: DeploymentEvent,
    guard: DeployGuard,
) -> DeploymentOutcome {
    let deployment_id = guard.info().deployment_id.clone();
    let started_at = guard.info().started_at;

    info!(
        deployment_id = %deployment_id,
        reference = %event.reference,
        commit = ?event.commit,
        delivery = ?event.delivery_id,
        "Deployment started"
    );

    let outcome = state.executor.run(&deployment_id).await;

    let record = DeploymentRecord::from_outcome(&event, &outcome, started_at);
    let elapsed_ms = (record.finished_at - started_at).num_milliseconds();
    let steps_succeeded = outcome.steps.iter().filter(|s| s.succeeded()).count();
    if outcome.is_success() {
        info!(
            deployment_id = %deployment_id,
            status = record.status.as_str(),
            steps_succeeded = steps_succeeded,
            elapsed_ms = elapsed_ms,
            "Deployment finished"
        );
    } else {
        error!(
            deployment_id = %deployment_id,
            status = record.status.as_str(),
            failed_step = ?outcome.failed_step,
            steps_succeeded = steps_succeeded,
            elapsed_ms = elapsed_ms,
            "Deployment failed; stack left as of the last successful step"
        );
    }
    state.history.record(record).await;

    drop(guard);
    outcome
}

/// 从 stderr 尾部中去掉密钥
///
/// 尾部是截断后的输出，密钥可能只剩后半段出现在开头，这部分同样遮盖
fn redact(text: &str, secret: Option<&str>) -> String {
    let secret = match secret {
        Some(secret) if !secret.is_empty() => secret,
        _ => return text.to_string(),
    };
    let redacted = text.replace(secret, "***");
    let cut = secret
        .char_indices()
        .skip(1)
        .map(|(i, _)| &secret[i..])
        .find(|suffix| redacted.starts_with(suffix));
    match cut {
        Some(suffix) => format!("***{}", &redacted[suffix.len()..]),
        None => redacted,
    }
}
