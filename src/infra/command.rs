//! 命令执行器
//!
//! 提供流水线步骤的执行接口，支持：
//! - 超时控制（超时后强制终止进程）
//! - stdout/stderr 逐行记录日志（超长行分段记录）
//! - stderr 尾部截留（按块读取，内存有界）

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::deploy::PipelineStep;

/// 进程结束后等待输出读取完成的最长时间
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// 每次从管道读取的块大小
const READ_CHUNK: usize = 8 * 1024;

/// 单条日志记录的最大字节数，无换行的输出按此长度分段
const MAX_LOGGED_LINE: usize = 8 * 1024;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 等待命令完成失败
    WaitFailed(std::io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) | CommandError::WaitFailed(e) => Some(e),
        }
    }
}

/// 单步执行结果
#[derive(Debug, Clone, Default)]
pub struct StepExecution {
    /// 退出码（被信号终止或超时时为空）
    pub exit_code: Option<i32>,
    /// 是否因超时而终止
    pub timed_out: bool,
    /// stderr 尾部
    pub stderr_tail: String,
}

impl StepExecution {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// 步骤执行器
///
/// 生产环境使用 [`ProcessRunner`]，测试中可注入记录调用的假实现
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(
        &self,
        step: &PipelineStep,
        timeout: Duration,
        stderr_limit: usize,
    ) -> Result<StepExecution, CommandError>;
}

/// 基于 tokio::process 的步骤执行器
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl StepRunner for ProcessRunner {
    async fn run(
        &self,
        step: &PipelineStep,
        timeout: Duration,
        stderr_limit: usize,
    ) -> Result<StepExecution, CommandError> {
        let mut child = Command::new(&step.program)
            .args(&step.args)
            .current_dir(&step.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CommandError::SpawnFailed)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // 启动 stdout 读取任务
        let mut stdout_log = LineLogger::new(step.name.clone(), "stdout");
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                pump(stdout, |chunk| stdout_log.push(chunk)).await;
            }
            stdout_log.flush();
        });

        // 启动 stderr 读取任务，只保留尾部
        let mut stderr_log = LineLogger::new(step.name.clone(), "stderr");
        let stderr_task = tokio::spawn(async move {
            let mut tail = TailBuffer::new(stderr_limit);
            if let Some(stderr) = stderr {
                pump(stderr, |chunk| {
                    stderr_log.push(chunk);
                    tail.push(chunk);
                })
                .await;
            }
            stderr_log.flush();
            tail.into_string()
        });

        // 等待命令完成，支持超时
        let waited = tokio::select! {
            status = child.wait() => Some(status.map_err(CommandError::WaitFailed)?),
            _ = tokio::time::sleep(timeout) => None,
        };

        let (exit_code, timed_out) = match waited {
            Some(status) => (status.code(), false),
            None => {
                warn!(step = %step.name, "Step timed out after {:?}, killing process", timeout);
                // kill 会等待进程实际终止
                if let Err(e) = child.kill().await {
                    warn!(step = %step.name, error = %e, "Failed to kill timed out process");
                }
                (None, true)
            }
        };

        // 等待日志读取完成（子进程可能把管道继承给了孙进程）
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, stdout_task).await.is_err() {
            debug!(step = %step.name, "stdout reader did not finish in time");
        }
        let stderr_tail = match tokio::time::timeout(OUTPUT_DRAIN_GRACE, stderr_task).await {
            Ok(Ok(tail)) => tail,
            _ => String::new(),
        };

        Ok(StepExecution {
            exit_code,
            timed_out,
            stderr_tail,
        })
    }
}

/// 按固定大小的块读取直到 EOF 或读错误
async fn pump<R, F>(mut reader: R, mut sink: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink(&buf[..n]),
        }
    }
}

/// 把字节流切成行写入 debug 日志，缓存上限为 [`MAX_LOGGED_LINE`]
struct LineLogger {
    step: String,
    stream: &'static str,
    pending: Vec<u8>,
}

impl LineLogger {
    fn new(step: String, stream: &'static str) -> Self {
        Self {
            step,
            stream,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        for part in chunk.split_inclusive(|b| *b == b'\n') {
            match part.strip_suffix(b"\n") {
                Some(line) => {
                    self.pending.extend_from_slice(line);
                    self.flush();
                }
                None => {
                    self.pending.extend_from_slice(part);
                    if self.pending.len() >= MAX_LOGGED_LINE {
                        self.flush();
                    }
                }
            }
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                step = %self.step,
                stream = self.stream,
                "{}",
                String::from_utf8_lossy(&self.pending)
            );
            self.pending.clear();
        }
    }
}

/// 有界尾部缓冲：只保留最后 `limit` 字节
#[derive(Debug)]
pub struct TailBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(64 * 1024)),
            limit,
        }
    }

    /// 追加一段原始输出
    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.limit {
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.limit..]);
            return;
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.limit {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
        }
    }

    /// 转为字符串，截断点落在多字节字符中间时丢弃残缺部分
    pub fn into_string(self) -> String {
        let start = self
            .buf
            .iter()
            .position(|b| (*b as i8) >= -0x40)
            .unwrap_or(self.buf.len());
        String::from_utf8_lossy(&self.buf[start..])
            .trim_end()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_step(name: &str, script: &str) -> PipelineStep {
        PipelineStep::new(
            name,
            "sh",
            vec!["-c".to_string(), script.to_string()],
            std::env::temp_dir(),
        )
    }

    #[test]
    fn test_tail_buffer_keeps_last_bytes() {
        let mut tail = TailBuffer::new(8);
        tail.push(b"first line\n");
        tail.push(b"last\n");
        assert_eq!(tail.into_string(), "ne\nlast");
    }

    #[test]
    fn test_tail_buffer_under_limit() {
        let mut tail = TailBuffer::new(4096);
        tail.push(b"error: ");
        tail.push(b"build failed\n");
        assert_eq!(tail.into_string(), "error: build failed");
    }

    #[test]
    fn test_tail_buffer_drops_partial_utf8() {
        let mut tail = TailBuffer::new(4);
        // "é" 是两个字节，截断后只剩第二个字节
        tail.push("xéab\n".as_bytes());
        assert_eq!(tail.into_string(), "ab");
    }

    #[test]
    fn test_tail_buffer_memory_stays_bounded() {
        let mut tail = TailBuffer::new(4096);
        let chunk = [b'x'; 1000];
        for _ in 0..10_000 {
            tail.push(&chunk);
            assert!(tail.buf.len() <= 4096);
        }
        assert!(tail.buf.capacity() <= 4 * 4096);
        assert_eq!(tail.into_string().len(), 4096);
    }

    #[test]
    fn test_line_logger_splits_long_lines() {
        let mut log = LineLogger::new("build".to_string(), "stdout");
        let chunk = [b'#'; READ_CHUNK];
        for _ in 0..1_000 {
            log.push(&chunk);
            assert!(log.pending.len() < MAX_LOGGED_LINE + READ_CHUNK);
        }
        log.push(b"tail\nnext");
        assert_eq!(log.pending, b"next");
        log.flush();
        assert!(log.pending.is_empty());
    }

    #[tokio::test]
    async fn test_run_success() {
        let result = ProcessRunner
            .run(&sh_step("fetch", "echo hello"), Duration::from_secs(5), 4096)
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_run_failure_captures_stderr() {
        let result = ProcessRunner
            .run(
                &sh_step("build", "echo boom >&2; exit 3"),
                Duration::from_secs(5),
                4096,
            )
            .await
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr_tail, "boom");
    }

    #[tokio::test]
    async fn test_run_output_without_newlines() {
        // 约 20MB 无换行输出，只保留最后 4096 字节
        let script = "head -c 20000000 /dev/zero | tr '\\0' x; \
                      head -c 20000000 /dev/zero | tr '\\0' y >&2; exit 1";
        let result = ProcessRunner
            .run(&sh_step("build", script), Duration::from_secs(30), 4096)
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.stderr_tail.len(), 4096);
        assert!(result.stderr_tail.bytes().all(|b| b == b'y'));
    }

    #[tokio::test]
    async fn test_run_timeout_kills_process() {
        let started = std::time::Instant::now();
        let result = ProcessRunner
            .run(&sh_step("start", "exec sleep 30"), Duration::from_millis(200), 4096)
            .await
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.success());
        assert!(result.exit_code.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let step = PipelineStep::new(
            "fetch",
            "nonexistent_command_12345",
            vec![],
            std::env::temp_dir(),
        );
        let result = ProcessRunner.run(&step, Duration::from_secs(5), 4096).await;
        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }
}
