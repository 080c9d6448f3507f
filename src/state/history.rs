//! 部署历史
//!
//! 内存中保存最近的部署记录，超出上限时丢弃最旧的记录

use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::config::env::constants::MAX_DEPLOY_HISTORY;
use crate::domain::deploy::DeploymentRecord;

/// 部署历史
pub struct DeploymentHistory {
    /// 最新记录在队首
    records: RwLock<VecDeque<DeploymentRecord>>,
    /// 最大记录数
    max_records: usize,
}

impl DeploymentHistory {
    /// 创建新的部署历史
    pub fn new() -> Self {
        Self::with_capacity(MAX_DEPLOY_HISTORY)
    }

    /// 使用自定义上限创建
    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_records,
        }
    }

    /// 记录一次已结束的部署
    pub async fn record(&self, record: DeploymentRecord) {
        let mut records = self.records.write().await;
        records.push_front(record);
        while records.len() > self.max_records {
            records.pop_back();
        }
    }

    /// 最近的 `limit` 条记录（最新在前）
    pub async fn recent(&self, limit: usize) -> Vec<DeploymentRecord> {
        let records = self.records.read().await;
        records.iter().take(limit).cloned().collect()
    }

    /// 最近一次部署
    pub async fn last(&self) -> Option<DeploymentRecord> {
        self.records.read().await.front().cloned()
    }
}

impl Default for DeploymentHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deploy::DeployStatus;
    use chrono::Utc;

    fn record(id: &str) -> DeploymentRecord {
        DeploymentRecord {
            id: id.to_string(),
            reference: "refs/heads/main".to_string(),
            commit: None,
            status: DeployStatus::Success,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            steps: Vec::new(),
            failure_reason: None,
        }
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let history = DeploymentHistory::new();
        history.record(record("a")).await;
        history.record(record("b")).await;

        let recent = history.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "b");
        assert_eq!(history.last().await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let history = DeploymentHistory::with_capacity(2);
        history.record(record("a")).await;
        history.record(record("b")).await;
        history.record(record("c")).await;

        let ids: Vec<String> = history.recent(10).await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let history = DeploymentHistory::new();
        for id in ["a", "b", "c"] {
            history.record(record(id)).await;
        }
        assert_eq!(history.recent(1).await.len(), 1);
        assert!(DeploymentHistory::new().last().await.is_none());
    }
}
