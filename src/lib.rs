//! Deploy Hook Agent - 推送触发部署代理
//!
//! 接收代码托管平台的 push webhook，校验签名与目标分支后，
//! 串行执行 fetch → stop → build → start 部署流水线

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod services;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use config::EnvConfig;
pub use error::AgentError;
use state::app_state::{get_shutdown_token, trigger_shutdown};
use state::AppState;

/// 命令行运行时配置
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// 覆盖监听端口
    pub port_override: Option<u16>,
}

/// 初始化日志（RUST_LOG 控制级别，默认 info）
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    // 重复初始化（如测试中）时忽略
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 加载配置并运行 HTTP 服务，直到收到关闭信号
pub async fn init_and_run_agent_with_config(runtime: RuntimeConfig) -> Result<(), AgentError> {
    init_tracing();

    let mut config = EnvConfig::from_env()?;
    if let Some(port) = runtime.port_override {
        config.port = port;
    }

    if config.skips_verification() {
        warn!("==============================================================");
        warn!("INSECURE: no webhook secret configured, signature verification");
        warn!("is DISABLED. Anyone who can reach this port can trigger deploys.");
        warn!("==============================================================");
    }

    let state = Arc::new(AppState::new(config));
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| AgentError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!(
        addr = %addr,
        webhook_path = %state.config.webhook_path,
        version = crate::config::env::constants::VERSION,
        "Deploy hook agent listening"
    );

    let shutdown = get_shutdown_token();
    tokio::spawn(async {
        wait_for_signal().await;
        info!("Shutdown signal received, draining in-flight requests");
        trigger_shutdown();
    });

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(AgentError::Serve)?;

    info!("Deploy hook agent stopped");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
