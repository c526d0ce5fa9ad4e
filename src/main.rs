//! Cadence 演示入口
//!
//! 命令行参数中的每一项作为一个目标提交；stdin 每行是一条入站消息（可带 `data:` 前缀），
//! 或 `{"submit": "<goal>"}` 追加提交。stdin 结束且所有 Activity 完成后退出，Ctrl+C 立即退出。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cadence::activity::Activity;
use cadence::config::load_config;
use cadence::core::{ShutdownManager, ShutdownReason};
use cadence::gateway::Envelope;
use cadence::memory::InMemoryEpisodicStore;
use cadence::react::DemoBrain;
use cadence::Agent;
use serde_json::Value;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cadence::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let manager = Arc::new(ShutdownManager::new());
    manager.install_signal_handlers();

    let store = Arc::new(InMemoryEpisodicStore::new(cfg.memory.max_entries));
    let agent = Agent::start_with_token(&cfg, Arc::new(DemoBrain), store, manager.token());

    let mut submitted: Vec<Arc<Activity>> = Vec::new();
    for goal in std::env::args().skip(1) {
        submit(&agent, &goal, &mut submitted);
    }

    let inbox = agent.inbox();
    let token = manager.token();
    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            break;
        };

        if let Some(goal) = submit_request(&line) {
            submit(&agent, &goal, &mut submitted);
            continue;
        }
        match Envelope::from_line(&line) {
            Some(Ok(envelope)) => {
                if inbox.send(envelope.to_value()).is_err() {
                    tracing::warn!("Event router is gone, dropping inbound message");
                }
            }
            Some(Err(e)) => tracing::warn!("Skipping inbound line: {}", e),
            None => {}
        }
    }

    agent.wait_until_idle(Duration::from_millis(100)).await;
    manager.shutdown(ShutdownReason::Drained);
    agent.shutdown().await.context("Agent shutdown failed")?;
    tracing::info!("Exiting ({:?})", manager.reason());

    for activity in &submitted {
        println!("{}", serde_json::to_string(&activity.view())?);
    }
    Ok(())
}

fn submit(agent: &Agent, goal: &str, submitted: &mut Vec<Arc<Activity>>) {
    match agent.submit(goal) {
        Ok(activity) => {
            println!("submitted {} {}", activity.id(), activity.goal());
            submitted.push(activity);
        }
        Err(e) => tracing::warn!("Rejected goal '{}': {}", goal, e),
    }
}

/// stdin 在独立线程中逐行读取，EOF 时关闭通道
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// `{"submit": "<goal>"}` 形式的行
fn submit_request(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    value.get("submit")?.as_str().map(str::to_string)
}
