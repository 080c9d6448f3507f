//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// 配置错误
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error(
        "DEPLOY_WEBHOOK_SECRET is not set; set it, or set DEPLOY_INSECURE_SKIP_VERIFY=true to accept unsigned requests"
    )]
    MissingSecret,
}

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// 触发部署的目标 ref
    pub target_ref: String,
    /// Webhook 签名密钥（为空时需显式允许不校验）
    pub secret: Option<String>,
    /// 单步超时
    pub step_timeout: Duration,
    /// compose 文件路径
    pub compose_file: String,
    /// 仓库工作目录
    pub work_dir: PathBuf,
    /// git 远端名
    pub git_remote: String,
    /// compose 命令（如 "docker compose" 或 "docker-compose"）
    pub compose_command: Vec<String>,
    /// Webhook 路径
    pub webhook_path: String,
    /// 失败步骤保留的 stderr 字节数
    pub stderr_tail_bytes: usize,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        if env::var("WEBHOOK_SECRET").is_ok() && env::var("DEPLOY_WEBHOOK_SECRET").is_err() {
            warn!("Deprecated environment variable WEBHOOK_SECRET detected. Please use DEPLOY_WEBHOOK_SECRET");
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 通过查找函数加载配置（测试时传入内存 map）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or("PORT", &lookup, constants::DEFAULT_PORT)?;

        let target_ref = lookup("DEPLOY_TARGET_REF")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| constants::DEFAULT_TARGET_REF.to_string());

        let secret = load_with_fallback(&lookup, "DEPLOY_WEBHOOK_SECRET", "WEBHOOK_SECRET")
            .filter(|s| !s.is_empty());
        let skip_verify = lookup("DEPLOY_INSECURE_SKIP_VERIFY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if secret.is_none() && !skip_verify {
            return Err(ConfigError::MissingSecret);
        }

        let step_timeout_ms: u64 = parse_or(
            "DEPLOY_STEP_TIMEOUT_MS",
            &lookup,
            constants::DEFAULT_STEP_TIMEOUT_MS,
        )?;
        if step_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DEPLOY_STEP_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "must be greater than zero",
            });
        }

        let compose_file = lookup("DEPLOY_COMPOSE_FILE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "docker-compose.yml".to_string());

        let work_dir = lookup("DEPLOY_WORK_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let git_remote = lookup("DEPLOY_GIT_REMOTE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "origin".to_string());

        let raw_compose = lookup("DEPLOY_COMPOSE_COMMAND")
            .unwrap_or_else(|| "docker compose".to_string());
        let compose_command: Vec<String> =
            raw_compose.split_whitespace().map(str::to_string).collect();
        if compose_command.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "DEPLOY_COMPOSE_COMMAND",
                value: raw_compose,
                reason: "must name a program",
            });
        }

        let webhook_path = lookup("DEPLOY_WEBHOOK_PATH").unwrap_or_else(|| "/webhook".to_string());
        if !webhook_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                name: "DEPLOY_WEBHOOK_PATH",
                value: webhook_path,
                reason: "must start with '/'",
            });
        }
        // `:` 与 `*` 是路由参数语法
        if webhook_path.contains([':', '*']) {
            return Err(ConfigError::InvalidValue {
                name: "DEPLOY_WEBHOOK_PATH",
                value: webhook_path,
                reason: "must be a literal path without ':' or '*'",
            });
        }
        if constants::RESERVED_PATHS.contains(&webhook_path.as_str()) {
            return Err(ConfigError::InvalidValue {
                name: "DEPLOY_WEBHOOK_PATH",
                value: webhook_path,
                reason: "collides with a built-in endpoint",
            });
        }

        let stderr_tail_bytes = parse_or(
            "DEPLOY_STDERR_TAIL_BYTES",
            &lookup,
            constants::DEFAULT_STDERR_TAIL_BYTES,
        )?;

        Ok(Self {
            port,
            target_ref,
            secret,
            step_timeout: Duration::from_millis(step_timeout_ms),
            compose_file,
            work_dir,
            git_remote,
            compose_command,
            webhook_path,
            stderr_tail_bytes,
        })
    }

    /// 是否跳过签名校验
    pub fn skips_verification(&self) -> bool {
        self.secret.is_none()
    }
}

/// 解析数值变量，未设置时使用默认值，格式错误时报错
fn parse_or<T, F>(name: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name,
                value,
                reason: "not a valid number",
            })
        }
        _ => Ok(default),
    }
}

/// 加载环境变量，支持 fallback
fn load_with_fallback<F>(lookup: &F, primary: &str, fallback: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(primary).or_else(|| lookup(fallback))
}

/// 常量
pub mod constants {
    /// 默认监听端口
    pub const DEFAULT_PORT: u16 = 9000;

    /// 默认目标 ref
    pub const DEFAULT_TARGET_REF: &str = "refs/heads/main";

    /// 单步默认超时（毫秒）
    pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 300_000; // 5 分钟

    /// 失败步骤 stderr 默认保留字节数
    pub const DEFAULT_STDERR_TAIL_BYTES: usize = 4096;

    /// 内置端点，webhook 路径不能与之重复
    pub const RESERVED_PATHS: [&str; 3] = ["/health", "/status", "/deployments/recent"];

    /// 部署历史最大保存数量
    pub const MAX_DEPLOY_HISTORY: usize = 50;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_with_secret() {
        let config = EnvConfig::from_lookup(lookup_from(&[("DEPLOY_WEBHOOK_SECRET", "s3cr3t")]))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.target_ref, "refs/heads/main");
        assert_eq!(config.secret.as_deref(), Some("s3cr3t"));
        assert_eq!(config.step_timeout, Duration::from_secs(300));
        assert_eq!(config.compose_file, "docker-compose.yml");
        assert_eq!(config.compose_command, vec!["docker", "compose"]);
        assert_eq!(config.webhook_path, "/webhook");
        assert_eq!(config.stderr_tail_bytes, 4096);
        assert!(!config.skips_verification());
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = EnvConfig::from_lookup(lookup_from(&[]));
        assert_eq!(result.unwrap_err(), ConfigError::MissingSecret);
    }

    #[test]
    fn test_missing_secret_allowed_with_opt_in() {
        let config =
            EnvConfig::from_lookup(lookup_from(&[("DEPLOY_INSECURE_SKIP_VERIFY", "true")]))
                .unwrap();
        assert!(config.skips_verification());
    }

    #[test]
    fn test_secret_fallback_name() {
        let config =
            EnvConfig::from_lookup(lookup_from(&[("WEBHOOK_SECRET", "legacy")])).unwrap();
        assert_eq!(config.secret.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_overrides() {
        let config = EnvConfig::from_lookup(lookup_from(&[
            ("DEPLOY_WEBHOOK_SECRET", "x"),
            ("PORT", "8088"),
            ("DEPLOY_TARGET_REF", "refs/heads/release"),
            ("DEPLOY_STEP_TIMEOUT_MS", "1500"),
            ("DEPLOY_COMPOSE_COMMAND", "docker-compose"),
            ("DEPLOY_WORK_DIR", "/srv/app"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8088);
        assert_eq!(config.target_ref, "refs/heads/release");
        assert_eq!(config.step_timeout, Duration::from_millis(1500));
        assert_eq!(config.compose_command, vec!["docker-compose"]);
        assert_eq!(config.work_dir, PathBuf::from("/srv/app"));
    }

    #[test]
    fn test_invalid_numbers() {
        let err = EnvConfig::from_lookup(lookup_from(&[
            ("DEPLOY_WEBHOOK_SECRET", "x"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));

        let err = EnvConfig::from_lookup(lookup_from(&[
            ("DEPLOY_WEBHOOK_SECRET", "x"),
            ("DEPLOY_STEP_TIMEOUT_MS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "DEPLOY_STEP_TIMEOUT_MS", .. }
        ));
    }

    #[test]
    fn test_invalid_webhook_path() {
        let err = EnvConfig::from_lookup(lookup_from(&[
            ("DEPLOY_WEBHOOK_SECRET", "x"),
            ("DEPLOY_WEBHOOK_PATH", "hooks"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "DEPLOY_WEBHOOK_PATH", .. }));
    }

    #[test]
    fn test_webhook_path_with_route_syntax() {
        for path in ["/hooks/*", "/a/:", "/hooks/:id", "/deploy*"] {
            let err = EnvConfig::from_lookup(lookup_from(&[
                ("DEPLOY_WEBHOOK_SECRET", "x"),
                ("DEPLOY_WEBHOOK_PATH", path),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { name: "DEPLOY_WEBHOOK_PATH", .. }),
                "{path} should be rejected"
            );
        }

        let config = EnvConfig::from_lookup(lookup_from(&[
            ("DEPLOY_WEBHOOK_SECRET", "x"),
            ("DEPLOY_WEBHOOK_PATH", "/hooks/deploy-main"),
        ]))
        .unwrap();
        assert_eq!(config.webhook_path, "/hooks/deploy-main");
    }

    #[test]
    fn test_reserved_webhook_path() {
        let err = EnvConfig::from_lookup(lookup_from(&[
            ("DEPLOY_WEBHOOK_SECRET", "x"),
            ("DEPLOY_WEBHOOK_PATH", "/health"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "DEPLOY_WEBHOOK_PATH", .. }));
    }

    #[test]
    fn test_empty_compose_command() {
        let err = EnvConfig::from_lookup(lookup_from(&[
            ("DEPLOY_WEBHOOK_SECRET", "x"),
            ("DEPLOY_COMPOSE_COMMAND", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "DEPLOY_COMPOSE_COMMAND", .. }));
    }
}
