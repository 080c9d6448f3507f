//! 基础设施模块
//!
//! 封装外部依赖（进程执行等）

pub mod command;

#[cfg(test)]
pub mod testing;

pub use command::{CommandError, ProcessRunner, StepExecution, StepRunner};
