//! 测试用的步骤执行器替身

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::command::{CommandError, StepExecution, StepRunner, TailBuffer};
use crate::domain::deploy::PipelineStep;

enum Behavior {
    Exit { code: i32, stderr: String },
    TimeOut,
    SpawnError,
}

/// 步骤内的暂停点：步骤开始时触发 `entered`，随后等待 `release`
#[derive(Clone, Default)]
pub struct StepGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// 记录每个被调用的步骤；未特别指定时一律成功
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    behaviors: HashMap<String, Behavior>,
    gates: HashMap<String, StepGate>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, step: &str, code: i32, stderr: &str) -> Self {
        self.behaviors.insert(
            step.to_string(),
            Behavior::Exit {
                code,
                stderr: stderr.to_string(),
            },
        );
        self
    }

    pub fn time_out(mut self, step: &str) -> Self {
        self.behaviors.insert(step.to_string(), Behavior::TimeOut);
        self
    }

    pub fn spawn_error(mut self, step: &str) -> Self {
        self.behaviors.insert(step.to_string(), Behavior::SpawnError);
        self
    }

    pub fn gate(mut self, step: &str, gate: StepGate) -> Self {
        self.gates.insert(step.to_string(), gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl StepRunner for RecordingRunner {
    async fn run(
        &self,
        step: &PipelineStep,
        _timeout: Duration,
        stderr_limit: usize,
    ) -> Result<StepExecution, CommandError> {
        self.calls.lock().unwrap().push(step.name.clone());

        if let Some(gate) = self.gates.get(&step.name) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        match self.behaviors.get(&step.name) {
            None => Ok(StepExecution {
                exit_code: Some(0),
                ..Default::default()
            }),
            Some(Behavior::Exit { code, stderr }) => {
                let mut tail = TailBuffer::new(stderr_limit);
                tail.push(stderr.as_bytes());
                Ok(StepExecution {
                    exit_code: Some(*code),
                    timed_out: false,
                    stderr_tail: tail.into_string(),
                })
            }
            Some(Behavior::TimeOut) => Ok(StepExecution {
                exit_code: None,
                timed_out: true,
                stderr_tail: String::new(),
            }),
            Some(Behavior::SpawnError) => Err(CommandError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "program not found",
            ))),
        }
    }
}
