//! Test fixtures for master directories and in-process agents.

use br_core::agent::Agent;
use br_core::command::connection::AgentLink;
use br_core::command::transport::channel_pair;
use br_protocol::ipc::BuildEvent;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Create a temporary master root with `.buildrelay/master.toml` and the
/// given builder files (`(file name, yaml)`).
///
/// Returns a TempDir that must be kept alive for the test duration.
#[allow(dead_code)]
pub fn create_test_master(builders: &[(&str, &str)]) -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let master_dir = temp_dir.path().join(".buildrelay");
    std::fs::create_dir_all(master_dir.join("builders"))?;

    let master_toml = r#"
title = "integration"

[properties]
greeting = "hi"
project = "integration"

[agent]
name = "local"
basedir = "agent"
"#;
    std::fs::write(master_dir.join("master.toml"), master_toml)?;

    for (file, yaml) in builders {
        std::fs::write(master_dir.join("builders").join(file), yaml)?;
    }
    Ok(temp_dir)
}

/// Start an agent serving commands under `basedir` over an in-process
/// transport and attach to it.
#[allow(dead_code)]
pub async fn attach_local_agent(
    basedir: &Path,
    environ: BTreeMap<String, String>,
) -> (AgentLink, JoinHandle<()>) {
    let (master, agent_side) = channel_pair(64);
    let agent = Agent::new("local", basedir).with_environ(environ);
    let served = tokio::spawn(async move {
        if let Err(err) = agent.serve(agent_side).await {
            panic!("agent failed: {err}");
        }
    });
    let link = AgentLink::connect(master)
        .await
        .expect("agent should say hello");
    (link, served)
}

/// Drain every event currently buffered, waiting briefly for stragglers.
#[allow(dead_code)]
pub async fn collect_events(rx: &mut mpsc::Receiver<BuildEvent>) -> Vec<BuildEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        events.push(event);
    }
    events
}
