//! 部署锁
//!
//! 进程级互斥：同一时刻最多只有一个部署在执行。
//! 获取是非阻塞的；`DeployGuard` 被 drop 时释放（包括 panic 和超时路径）。

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

/// 当前持有锁的部署信息
#[derive(Clone, Debug)]
pub struct ActiveDeploy {
    pub deployment_id: String,
    pub reference: String,
    pub started_at: DateTime<Utc>,
}

/// 部署锁
#[derive(Clone, Debug, Default)]
pub struct DeployLock {
    active: Arc<Mutex<Option<ActiveDeploy>>>,
}

/// 部署锁的持有凭证
#[derive(Debug)]
pub struct DeployGuard {
    active: Arc<Mutex<Option<ActiveDeploy>>>,
    info: ActiveDeploy,
}

impl DeployLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取锁，已被持有时立即返回 None
    pub fn try_acquire(&self, deployment_id: &str, reference: &str) -> Option<DeployGuard> {
        let mut slot = lock_slot(&self.active);
        if slot.is_some() {
            return None;
        }
        let info = ActiveDeploy {
            deployment_id: deployment_id.to_string(),
            reference: reference.to_string(),
            started_at: Utc::now(),
        };
        *slot = Some(info.clone());
        Some(DeployGuard {
            active: self.active.clone(),
            info,
        })
    }

    /// 是否有部署正在进行
    pub fn is_held(&self) -> bool {
        lock_slot(&self.active).is_some()
    }

    /// 当前部署信息
    pub fn current(&self) -> Option<ActiveDeploy> {
        lock_slot(&self.active).clone()
    }
}

impl DeployGuard {
    pub fn info(&self) -> &ActiveDeploy {
        &self.info
    }
}

impl Drop for DeployGuard {
    fn drop(&mut self) {
        *lock_slot(&self.active) = None;
        tracing::debug!(deployment_id = %self.info.deployment_id, "Deploy lock released");
    }
}

/// 临界区内不会 panic，锁中毒时直接取回内部数据
fn lock_slot(active: &Mutex<Option<ActiveDeploy>>) -> MutexGuard<'_, Option<ActiveDeploy>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
