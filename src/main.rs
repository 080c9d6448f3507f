//! Deploy Hook Agent - 推送触发部署代理
//!
//! Usage:
//! - Normal mode: `deploy-hook-agent`
//! - With custom port: `deploy-hook-agent --port 19999`
//!
//! Configuration is read from the environment (see `config::env`).

use deploy_hook_agent::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                if config.port_override.is_none() {
                    eprintln!("Ignoring invalid --port value: {}", args[i + 1]);
                }
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("deploy-hook-agent {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Deploy Hook Agent - 推送触发部署代理");
    println!();
    println!("USAGE:");
    println!("    deploy-hook-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -V, --version    Print version");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    PORT                          Listening port (default 9000)");
    println!("    DEPLOY_TARGET_REF             Ref that triggers a deploy (default refs/heads/main)");
    println!("    DEPLOY_WEBHOOK_SECRET         HMAC secret for X-Hub-Signature-256");
    println!("    DEPLOY_INSECURE_SKIP_VERIFY   Allow running without a secret (default false)");
    println!("    DEPLOY_STEP_TIMEOUT_MS        Per-step timeout (default 300000)");
    println!("    DEPLOY_COMPOSE_FILE           Compose file (default docker-compose.yml)");
    println!("    DEPLOY_WORK_DIR               Repository checkout (default .)");
    println!("    DEPLOY_GIT_REMOTE             Remote to pull from (default origin)");
    println!("    DEPLOY_COMPOSE_COMMAND        Compose invocation (default \"docker compose\")");
    println!("    DEPLOY_WEBHOOK_PATH           Webhook endpoint (default /webhook)");
    println!("    DEPLOY_STDERR_TAIL_BYTES      Stderr kept for a failed step (default 4096)");
    println!("    RUST_LOG                      Log filter (default info)");
}

fn main() {
    let config = parse_args();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = rt.block_on(deploy_hook_agent::init_and_run_agent_with_config(config));

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
