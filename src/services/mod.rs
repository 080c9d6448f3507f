//! 业务服务模块
//!
//! 事件过滤与部署执行

pub mod deploy;
pub mod filter;
