//! 默认部署流水线
//!
//! fetch → stop → build → start，任何一步失败都会中止

use crate::config::EnvConfig;
use crate::domain::deploy::PipelineStep;

pub const STEP_FETCH: &str = "fetch";
pub const STEP_STOP: &str = "stop";
pub const STEP_BUILD: &str = "build";
pub const STEP_START: &str = "start";

/// 根据配置的仓库与 compose 栈生成固定步骤列表
pub fn default_steps(config: &EnvConfig) -> Vec<PipelineStep> {
    let fetch_args = vec![
        "pull".to_string(),
        "--ff-only".to_string(),
        config.git_remote.clone(),
        config.target_ref.clone(),
    ];

    vec![
        PipelineStep::new(STEP_FETCH, "git", fetch_args, config.work_dir.clone()),
        compose_step(config, STEP_STOP, &["down"]),
        compose_step(config, STEP_BUILD, &["build"]),
        compose_step(config, STEP_START, &["up", "-d"]),
    ]
}

fn compose_step(config: &EnvConfig, name: &str, action: &[&str]) -> PipelineStep {
    // compose_command 在加载配置时已保证非空
    let mut parts = config.compose_command.iter();
    let program = parts.next().map(String::as_str).unwrap_or("docker");

    let mut args: Vec<String> = parts.cloned().collect();
    args.push("-f".to_string());
    args.push(config.compose_file.clone());
    args.extend(action.iter().map(|a| a.to_string()));

    PipelineStep::new(name, program, args, config.work_dir.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EnvConfig {
        EnvConfig::from_lookup(|name| match name {
            "DEPLOY_WEBHOOK_SECRET" => Some("x".to_string()),
            "DEPLOY_WORK_DIR" => Some("/srv/app".to_string()),
            "DEPLOY_COMPOSE_FILE" => Some("deploy/stack.yml".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_default_steps_order_and_commands() {
        let steps = default_steps(&config());
        let lines: Vec<String> = steps.iter().map(|s| s.command_line()).collect();
        assert_eq!(
            lines,
            vec![
                "git pull --ff-only origin refs/heads/main",
                "docker compose -f deploy/stack.yml down",
                "docker compose -f deploy/stack.yml build",
                "docker compose -f deploy/stack.yml up -d",
            ]
        );
        assert!(steps.iter().all(|s| s.abort_on_failure));
        assert!(steps.iter().all(|s| s.work_dir.to_str() == Some("/srv/app")));
    }

    #[test]
    fn test_standalone_compose_binary() {
        let mut cfg = config();
        cfg.compose_command = vec!["docker-compose".to_string()];
        let steps = default_steps(&cfg);
        assert_eq!(steps[1].program, "docker-compose");
        assert_eq!(steps[1].args, vec!["-f", "deploy/stack.yml", "down"]);
    }
}
