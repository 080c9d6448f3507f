//! 运行时状态模块
//!
//! 管理应用状态、部署锁和部署历史

pub mod app_state;
pub mod deploy_lock;
pub mod history;

pub use app_state::AppState;
pub use deploy_lock::{ActiveDeploy, DeployGuard, DeployLock};
pub use history::DeploymentHistory;
