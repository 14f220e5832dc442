//! SafeHarbor 命令行入口
//!
//! 从 stdin 逐行读取消息（同一个本地会话），每条消息的事件以 JSON 逐行打印到 stdout。
//! 以 `/trust <1-5>` 开头的行走管理员信任覆盖；`/quit` 退出。

use std::path::PathBuf;

use anyhow::Context;
use safeharbor::config::{load_config, AppConfig};
use safeharbor::context::{MAX_TRUST, MIN_TRUST};
use safeharbor::observability;
use safeharbor::OrchestratorBuilder;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let orchestrator = OrchestratorBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build orchestrator")?;

    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session_id = %session_id, "local session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(arg) = line.strip_prefix("/trust ") {
            let Some(level) = parse_trust_level(arg) else {
                tracing::warn!(input = arg, "trust level must be 1-5");
                println!(
                    "{}",
                    serde_json::json!({ "type": "admin", "error": "trust level must be 1-5" })
                );
                continue;
            };
            let applied = orchestrator.admin_set_trust(&session_id, level).await;
            println!("{}", serde_json::json!({ "type": "admin", "trust_applied": applied }));
            continue;
        }

        for event in orchestrator.handle_message(&session_id, line).await {
            let json = serde_json::to_string(&event).context("Failed to encode event")?;
            println!("{json}");
        }
    }

    orchestrator.disconnect(&session_id);
    Ok(())
}

/// `/trust` 参数：1-5 的整数，其他输入返回 None
fn parse_trust_level(arg: &str) -> Option<u8> {
    arg.trim().parse().ok().filter(|level| (MIN_TRUST..=MAX_TRUST).contains(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trust_level() {
        assert_eq!(parse_trust_level(" 3 "), Some(3));
        assert_eq!(parse_trust_level("5"), Some(5));
        assert_eq!(parse_trust_level("abc"), None);
        assert_eq!(parse_trust_level("0"), None);
        assert_eq!(parse_trust_level("9"), None);
        assert_eq!(parse_trust_level("-1"), None);
    }
}
