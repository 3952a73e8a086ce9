//! End-to-end builds: configuration loaded from disk, compiled, and run by
//! the build manager against a real agent executing real processes.

mod common;

use br_core::build::BuildRequest;
use br_core::command::connection::AgentConnection;
use br_core::config::load_config;
use br_core::state::BuildManager;
use br_protocol::build_models::{BuildResult, BuildStatus};
use common::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const RELEASE_BUILDER: &str = r#"name: release
properties:
  artifact: out.txt
steps:
  - type: rmdir
    dir: build
  - type: mkdir
    dir: build
  - type: shell
    name: generate
    command: "echo %(prop:greeting)s > %(prop:artifact)s && cat %(prop:artifact)s"
    property: generated
  - type: cpdir
    fromdir: build
    todir: archive
  - type: set-properties-from-env
    variables: [BR_E2E_HOME, BR_E2E_UNSET]
"#;

const FLAKY_BUILDER: &str = r#"name: flaky
steps:
  - type: mkdir
    dir: build
  - type: shell
    name: compile
    command: ["sh", "-c", "echo broken >&2; exit 3"]
    halt-on-failure: true
  - type: shell
    name: test
    command: "echo never"
  - type: rmdir
    name: cleanup
    dir: build
    always-run: true
"#;

const SLOW_BUILDER: &str = r#"name: slow
steps:
  - type: mkdir
    dir: build
  - type: shell
    name: wait
    command: ["sleep", "30"]
"#;

struct Fixture {
    _root: tempfile::TempDir,
    basedir: std::path::PathBuf,
    manager: BuildManager,
    events_rx: mpsc::Receiver<br_protocol::ipc::BuildEvent>,
}

async fn fixture() -> Fixture {
    let root = create_test_master(&[
        ("release.yaml", RELEASE_BUILDER),
        ("flaky.yaml", FLAKY_BUILDER),
        ("slow.yml", SLOW_BUILDER),
    ])
    .expect("Failed to create master directory");

    let config = load_config(root.path()).await.expect("Failed to load config");
    let builders = config.compile().expect("Config should compile");
    let basedir = root.path().join(&config.master.agent.basedir);

    let mut environ = BTreeMap::new();
    environ.insert("BR_E2E_HOME".to_string(), "/home/e2e".to_string());
    let (link, _served) = attach_local_agent(&basedir, environ).await;
    assert_eq!(link.agent_name(), "local");

    let (events_tx, events_rx) = mpsc::channel(1024);
    let manager = BuildManager::new(
        builders,
        config.master.properties.clone(),
        Arc::new(link),
        events_tx,
    );

    Fixture {
        _root: root,
        basedir,
        manager,
        events_rx,
    }
}

#[tokio::test]
async fn test_release_build_runs_every_step() {
    let mut fx = fixture().await;
    assert_eq!(fx.manager.builder_names(), vec!["flaky", "release", "slow"]);

    let id = fx
        .manager
        .start_build("release", BuildRequest::new())
        .await
        .unwrap();
    let record = tokio::time::timeout(Duration::from_secs(20), fx.manager.wait(id))
        .await
        .expect("build should finish")
        .unwrap();

    assert_eq!(record.status, BuildStatus::Finished);
    assert_eq!(record.result, BuildResult::Success);
    assert_eq!(record.text, vec!["build", "successful"]);
    assert_eq!(record.number, 1);

    let archived = std::fs::read_to_string(fx.basedir.join("archive/out.txt"))
        .expect("artifact should be archived");
    assert_eq!(archived, "hi\n");

    let property = |name: &str| record.properties.iter().find(|entry| entry.name == name);
    let generated = property("generated").expect("stdout property should be set");
    assert_eq!(generated.value, json!("hi"));
    assert_eq!(generated.source, "generate");
    assert!(generated.runtime);

    let home = property("BR_E2E_HOME").expect("environment property should be set");
    assert_eq!(home.value, json!("/home/e2e"));
    assert_eq!(home.source, "AgentEnvironment");
    assert!(property("BR_E2E_UNSET").is_none());

    assert_eq!(property("buildername").unwrap().value, json!("release"));
    assert_eq!(property("buildnumber").unwrap().value, json!(1));
    assert_eq!(property("greeting").unwrap().source, "Global");
    assert_eq!(property("project").unwrap().source, "Build");

    let events = collect_events(&mut fx.events_rx).await;
    assert_build_bracketed(&events, BuildResult::Success);
    assert_eq!(
        started_steps(&events),
        vec!["rmdir", "mkdir", "generate", "cpdir", "set-properties-from-env"]
    );
    assert!(has_log_containing(&events, "hi"));
}

#[tokio::test]
async fn test_halted_build_still_runs_cleanup() {
    let mut fx = fixture().await;

    let id = fx
        .manager
        .start_build("flaky", BuildRequest::new())
        .await
        .unwrap();
    let record = tokio::time::timeout(Duration::from_secs(20), fx.manager.wait(id))
        .await
        .expect("build should finish")
        .unwrap();

    assert_eq!(record.result, BuildResult::Failure);
    assert_eq!(record.text, vec!["failed"]);
    let steps: Vec<(&str, BuildResult)> = record
        .step_results
        .iter()
        .map(|(name, result)| (name.as_str(), *result))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("mkdir", BuildResult::Success),
            ("compile", BuildResult::Failure),
            ("cleanup", BuildResult::Success),
        ]
    );
    assert!(!fx.basedir.join("build").exists());

    let events = collect_events(&mut fx.events_rx).await;
    assert_build_bracketed(&events, BuildResult::Failure);
    assert!(has_log_containing(&events, "broken"));
    assert!(!started_steps(&events).contains(&"test".to_string()));
}

#[tokio::test]
async fn test_stop_interrupts_running_process() {
    let mut fx = fixture().await;

    let id = fx
        .manager
        .start_build("slow", BuildRequest::new())
        .await
        .unwrap();

    // Wait until the sleep is running before stopping.
    loop {
        match tokio::time::timeout(Duration::from_secs(10), fx.events_rx.recv()).await {
            Ok(Some(br_protocol::ipc::BuildEvent::StepStarted { step_name, .. }))
                if step_name == "wait" =>
            {
                break
            }
            Ok(Some(_)) => continue,
            other => panic!("build never reached the slow step: {other:?}"),
        }
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    fx.manager.stop_build(id, "no longer needed").await.unwrap();
    let record = tokio::time::timeout(Duration::from_secs(15), fx.manager.wait(id))
        .await
        .expect("stopped build should finish promptly")
        .unwrap();

    assert_eq!(record.status, BuildStatus::Stopped);
    assert_eq!(record.result, BuildResult::Exception);
    assert_eq!(record.text, vec!["stopped"]);
}

#[tokio::test]
async fn test_rebuild_reuses_request_properties() {
    let mut fx = fixture().await;

    let request = BuildRequest::new().with_property("greeting", "bonjour");
    let first = fx.manager.start_build("release", request).await.unwrap();
    let first_record = fx.manager.wait(first).await.unwrap();
    assert_eq!(first_record.result, BuildResult::Success);

    let second = fx.manager.rebuild(first).await.unwrap();
    let second_record = fx.manager.wait(second).await.unwrap();

    assert_eq!(second_record.number, 2);
    let generated = second_record
        .properties
        .iter()
        .find(|entry| entry.name == "generated")
        .unwrap();
    assert_eq!(generated.value, json!("bonjour"));
    assert_eq!(fx.manager.build_count().await, 2);

    drop(collect_events(&mut fx.events_rx).await);
}
