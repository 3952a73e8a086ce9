//! The master's handle for one unit of work dispatched to an agent.
//!
//! A [`RemoteCommand`] dispatches its spec, relays status updates to an
//! optional observer and settles on exactly one [`CommandOutcome`]:
//!
//! - an `rc` update, or a completion without one, yields `Succeeded`
//! - a completion with failure text or a lost connection yields `Failed`
//! - the silence timer (reset by every update) or the max-time timer
//!   (started at dispatch) yields `TimedOut` and one interrupt request
//! - an interrupt from the owner yields `Failed` and one interrupt request
//!
//! Signals arriving after the outcome are ignored.

use br_protocol::command_models::{CommandOutcome, CommandState, CommandUpdate, RemoteCommandSpec};
use br_protocol::ipc::CommandId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{AgentConnection, CommandSignal};
use super::interrupt::InterruptHandle;

/// One remote command and its lifecycle.
pub struct RemoteCommand {
    id: CommandId,
    spec: RemoteCommandSpec,
    state: CommandState,
    observer: Option<mpsc::UnboundedSender<CommandUpdate>>,
    interrupt: Option<InterruptHandle>,
}

impl RemoteCommand {
    /// A command in the `Created` state with a fresh id.
    pub fn new(spec: RemoteCommandSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            state: CommandState::Created,
            observer: None,
            interrupt: None,
        }
    }

    /// Relays every status update, including `rc`, to `observer`.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<CommandUpdate>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Lets the owner abandon the command.
    pub fn with_interrupt(mut self, interrupt: InterruptHandle) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn spec(&self) -> &RemoteCommandSpec {
        &self.spec
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Dispatches the command on `conn` and waits for its outcome.
    ///
    /// Never returns an error: transport failures become `Failed`.
    pub async fn run(&mut self, conn: &dyn AgentConnection) -> CommandOutcome {
        let silence = self.spec.silence_timeout();
        let max_deadline = self.spec.max_time().and_then(deadline_after);
        let mut interrupt = self.interrupt.take();

        self.state = CommandState::Dispatched;
        info!(
            command_id = %self.id,
            header = self.spec.header(),
            agent = conn.agent_name(),
            timeout = %describe_timeout(silence),
            "dispatching remote command"
        );

        let mut signals = match conn.start_command(self.id, self.spec.clone()).await {
            Ok(signals) => signals,
            Err(err) => {
                return self.settle(CommandOutcome::Failed {
                    reason: err.to_string(),
                })
            }
        };

        let mut silence_deadline = silence.and_then(deadline_after);

        let outcome = loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(CommandSignal::Update(update)) => {
                        if self.state == CommandState::Dispatched {
                            self.state = CommandState::Running;
                        }
                        silence_deadline = silence.and_then(deadline_after);
                        let code = match &update {
                            CommandUpdate::Rc(code) => Some(*code),
                            _ => None,
                        };
                        if let Some(observer) = &self.observer {
                            let _ = observer.send(update);
                        }
                        if let Some(code) = code {
                            break CommandOutcome::Succeeded { rc: code };
                        }
                    }
                    Some(CommandSignal::Complete(Some(reason))) => {
                        break CommandOutcome::Failed { reason };
                    }
                    Some(CommandSignal::Complete(None)) => {
                        break CommandOutcome::Succeeded { rc: 0 };
                    }
                    Some(CommandSignal::Lost(reason)) => {
                        break CommandOutcome::Failed { reason };
                    }
                    None => {
                        break CommandOutcome::Failed {
                            reason: "agent connection closed".to_string(),
                        };
                    }
                },
                _ = sleep_until(silence_deadline) => {
                    let reason = format!(
                        "command timed out: {} seconds without output",
                        silence.map_or(0.0, |d| d.as_secs_f64())
                    );
                    self.request_kill(conn, &reason).await;
                    break CommandOutcome::TimedOut { reason };
                }
                _ = sleep_until(max_deadline) => {
                    let reason = format!(
                        "command timed out: {} seconds elapsed",
                        self.spec.max_time().map_or(0.0, |d| d.as_secs_f64())
                    );
                    self.request_kill(conn, &reason).await;
                    break CommandOutcome::TimedOut { reason };
                }
                reason = wait_interrupt(&mut interrupt) => {
                    self.request_kill(conn, &reason).await;
                    break CommandOutcome::Failed { reason };
                }
            }
        };

        self.settle(outcome)
    }

    async fn request_kill(&self, conn: &dyn AgentConnection, reason: &str) {
        warn!(command_id = %self.id, reason, "interrupting remote command");
        if let Err(err) = conn.interrupt_command(self.id, reason.to_string()).await {
            warn!(command_id = %self.id, error = %err, "failed to send interrupt");
        }
    }

    fn settle(&mut self, outcome: CommandOutcome) -> CommandOutcome {
        self.state = outcome.state();
        debug!(command_id = %self.id, state = ?self.state, "remote command settled");
        self.state = CommandState::Finished;
        outcome
    }
}

/// `now + delay`, or `None` if that is beyond what a clock can represent.
pub(crate) fn deadline_after(delay: Duration) -> Option<Instant> {
    Instant::now().checked_add(delay)
}

pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_interrupt(interrupt: &mut Option<InterruptHandle>) -> String {
    match interrupt {
        Some(handle) => handle.wait().await,
        None => std::future::pending().await,
    }
}

/// Seconds as shown in timeout messages.
pub fn describe_timeout(timeout: Option<Duration>) -> String {
    timeout.map_or_else(|| "none".to_string(), |d| format!("{}s", d.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::error::{CommandError, CommandResult};
    use crate::command::interrupt::interrupt_pair;
    use async_trait::async_trait;
    use br_protocol::command_models::ShellArgs;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Connection that hands the test the sending side of each command's
    /// signal channel and records interrupts.
    #[derive(Default)]
    struct FakeConnection {
        environ: BTreeMap<String, String>,
        senders: Mutex<Vec<mpsc::UnboundedSender<CommandSignal>>>,
        interrupts: Mutex<Vec<(CommandId, String)>>,
        refuse: bool,
    }

    #[async_trait]
    impl AgentConnection for FakeConnection {
        fn agent_name(&self) -> &str {
            "fake"
        }

        fn environ(&self) -> &BTreeMap<String, String> {
            &self.environ
        }

        async fn start_command(
            &self,
            _command_id: CommandId,
            _spec: RemoteCommandSpec,
        ) -> CommandResult<mpsc::UnboundedReceiver<CommandSignal>> {
            if self.refuse {
                return Err(CommandError::ConnectionClosed);
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }

        async fn interrupt_command(&self, command_id: CommandId, reason: String) -> CommandResult<()> {
            self.interrupts.lock().unwrap().push((command_id, reason));
            Ok(())
        }
    }

    fn shell(timeout: Option<f64>, max_time: Option<f64>) -> RemoteCommandSpec {
        let mut args = ShellArgs::new("build", vec!["make".to_string()]);
        args.timeout = timeout;
        args.max_time = max_time;
        RemoteCommandSpec::Shell(args)
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_timeout_fires_once_with_one_interrupt() {
        let conn = FakeConnection::default();
        let mut command = RemoteCommand::new(shell(Some(1.0), None));

        let outcome = command.run(&conn).await;

        assert!(matches!(outcome, CommandOutcome::TimedOut { .. }));
        assert_eq!(command.state(), CommandState::Finished);
        let interrupts = conn.interrupts.lock().unwrap();
        assert_eq!(interrupts.len(), 1);
        assert_eq!(interrupts[0].0, command.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_reset_silence_timer() {
        let conn = std::sync::Arc::new(FakeConnection::default());
        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        let mut command = RemoteCommand::new(shell(Some(2.0), None)).with_observer(observer_tx);

        let feeder_conn = std::sync::Arc::clone(&conn);
        let feeder = tokio::spawn(async move {
            for chunk in ["a", "b", "c"] {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                let senders = feeder_conn.senders.lock().unwrap();
                let _ = senders[0].send(CommandSignal::Update(CommandUpdate::Stdout(chunk.to_string())));
            }
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let senders = feeder_conn.senders.lock().unwrap();
            let _ = senders[0].send(CommandSignal::Update(CommandUpdate::Rc(0)));
        });

        let outcome = command.run(conn.as_ref()).await;
        feeder.await.unwrap();

        assert_eq!(outcome, CommandOutcome::Succeeded { rc: 0 });
        assert!(conn.interrupts.lock().unwrap().is_empty());
        let mut seen = Vec::new();
        while let Ok(update) = observer_rx.try_recv() {
            seen.push(update);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[3], CommandUpdate::Rc(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_time_fires_despite_output() {
        let conn = std::sync::Arc::new(FakeConnection::default());
        let mut command = RemoteCommand::new(shell(Some(10.0), Some(3.0)));

        let feeder_conn = std::sync::Arc::clone(&conn);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let senders = feeder_conn.senders.lock().unwrap();
                if let Some(tx) = senders.first() {
                    if tx.send(CommandSignal::Update(CommandUpdate::Stdout("tick".into()))).is_err() {
                        break;
                    }
                }
            }
        });

        let outcome = command.run(conn.as_ref()).await;
        match outcome {
            CommandOutcome::TimedOut { reason } => assert!(reason.contains("elapsed")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(conn.interrupts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_huge_limits_do_not_expire() {
        assert!(deadline_after(Duration::MAX).is_none());
        assert!(deadline_after(Duration::from_secs(5)).is_some());

        let conn = std::sync::Arc::new(FakeConnection::default());
        let spec = shell(Some(1e20), Some(1e15));
        assert_eq!(spec.silence_timeout(), None);
        let mut command = RemoteCommand::new(spec);

        let feeder_conn = std::sync::Arc::clone(&conn);
        let feeder = tokio::spawn(async move {
            loop {
                tokio::task::yield_now().await;
                let senders = feeder_conn.senders.lock().unwrap();
                if let Some(tx) = senders.first() {
                    let _ = tx.send(CommandSignal::Update(CommandUpdate::Rc(0)));
                    break;
                }
            }
        });

        let outcome = command.run(conn.as_ref()).await;
        feeder.await.unwrap();

        assert_eq!(outcome, CommandOutcome::Succeeded { rc: 0 });
        assert!(conn.interrupts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_failure_and_lost_connection() {
        let conn = std::sync::Arc::new(FakeConnection::default());

        let mut failing = RemoteCommand::new(shell(None, None));
        let run = failing.run(conn.as_ref());
        let feeder_conn = std::sync::Arc::clone(&conn);
        let feed = async move {
            tokio::task::yield_now().await;
            let senders = feeder_conn.senders.lock().unwrap();
            let _ = senders[0].send(CommandSignal::Complete(Some("boom".to_string())));
            let _ = senders[0].send(CommandSignal::Update(CommandUpdate::Rc(0)));
        };
        let (outcome, ()) = tokio::join!(run, feed);
        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                reason: "boom".to_string()
            }
        );

        let mut lost = RemoteCommand::new(shell(None, None));
        let run = lost.run(conn.as_ref());
        let feeder_conn = std::sync::Arc::clone(&conn);
        let feed = async move {
            tokio::task::yield_now().await;
            let senders = feeder_conn.senders.lock().unwrap();
            let _ = senders[1].send(CommandSignal::Lost("agent connection closed".to_string()));
        };
        let (outcome, ()) = tokio::join!(run, feed);
        assert!(matches!(outcome, CommandOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_failed_outcome() {
        let conn = FakeConnection {
            refuse: true,
            ..Default::default()
        };
        let mut command = RemoteCommand::new(shell(None, None));
        let outcome = command.run(&conn).await;
        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                reason: "agent connection closed".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_interrupt_sends_one_interrupt() {
        let conn = FakeConnection::default();
        let (trigger, handle) = interrupt_pair();
        let mut command = RemoteCommand::new(shell(None, None)).with_interrupt(handle);

        trigger.fire("build stopped");
        let outcome = command.run(&conn).await;

        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                reason: "build stopped".to_string()
            }
        );
        assert_eq!(conn.interrupts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_describe_timeout() {
        assert_eq!(describe_timeout(None), "none");
        assert_eq!(describe_timeout(Some(Duration::from_secs(2))), "2s");
    }
}
