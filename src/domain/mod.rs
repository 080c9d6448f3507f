//! 领域模型模块
//!
//! 纯数据结构，不包含执行逻辑

pub mod deploy;

// Re-exports for convenience
pub use deploy::{
    DeployStatus, DeploymentEvent, DeploymentOutcome, DeploymentRecord, PipelineStep,
    StepResult, StepStatus,
};
