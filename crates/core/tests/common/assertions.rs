//! Assertion helpers over build event sequences.

use br_protocol::build_models::BuildResult;
use br_protocol::ipc::BuildEvent;

/// Whether some step produced a log chunk containing `needle`.
#[allow(dead_code)]
pub fn has_log_containing(events: &[BuildEvent], needle: &str) -> bool {
    events.iter().any(|event| {
        matches!(event, BuildEvent::StepLogChunk { content, .. } if content.contains(needle))
    })
}

/// Names of the steps that started, in order.
#[allow(dead_code)]
pub fn started_steps(events: &[BuildEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            BuildEvent::StepStarted { step_name, .. } => Some(step_name.clone()),
            _ => None,
        })
        .collect()
}

/// Assert the build started first and finished last with `result`.
#[allow(dead_code)]
pub fn assert_build_bracketed(events: &[BuildEvent], result: BuildResult) {
    assert!(
        matches!(events.first(), Some(BuildEvent::BuildStarted { .. })),
        "first event should be BuildStarted, got: {:?}",
        events.first()
    );
    match events.last() {
        Some(BuildEvent::BuildFinished { result: actual, .. }) => assert_eq!(*actual, result),
        other => panic!("last event should be BuildFinished, got: {other:?}"),
    }

    let started = events
        .iter()
        .filter(|event| matches!(event, BuildEvent::StepStarted { .. }))
        .count();
    let finished = events
        .iter()
        .filter(|event| matches!(event, BuildEvent::StepFinished { .. }))
        .count();
    assert_eq!(started, finished, "every started step should finish");
}
