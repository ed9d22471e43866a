//! Job lifecycle controller.
//!
//! Owns the authoritative console state, the poll timer, and the command
//! dispatchers. Presentation layers talk to it over channels: `UiCommand` in,
//! `ConsoleEvent` out. All state mutation happens inside one select loop, so
//! dispatch and reconciliation are serialized without locks and a tick's
//! facade call is always fully processed before the next tick is issued.

mod poller;
mod reconcile;

use crate::host::HostApi;
use crate::model::{
    timestamped, ConsoleEvent, ConsoleState, FormFields, JobStatus, PosterRequest,
};
use anyhow::Result;
use poller::Poller;
use reconcile::{reconcile, Effect};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub enum UiCommand {
    StartScrape(FormFields),
    Resume,
    PosterLogin(PosterRequest),
    PosterPost(PosterRequest),
    Quit,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub poll_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1200),
        }
    }
}

/// Drive the console until the UI disconnects or sends `Quit`.
pub async fn run_controller(
    host: Arc<dyn HostApi>,
    opts: ControllerOptions,
    event_tx: UnboundedSender<ConsoleEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut console = Console {
        host,
        state: ConsoleState::default(),
        poller: Poller::new(opts.poll_interval),
        event_tx,
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::StartScrape(fields)) => console.dispatch_start(fields).await,
                    Some(UiCommand::Resume) => console.dispatch_resume().await,
                    Some(UiCommand::PosterLogin(request)) => {
                        console.dispatch_poster_login(request).await
                    }
                    Some(UiCommand::PosterPost(request)) => {
                        console.dispatch_poster_post(request).await
                    }
                    Some(UiCommand::Quit) | None => break,
                }
            }
            _ = console.poller.tick() => {
                console.poll_once().await;
            }
        }
    }

    Ok(())
}

struct Console {
    host: Arc<dyn HostApi>,
    state: ConsoleState,
    poller: Poller,
    event_tx: UnboundedSender<ConsoleEvent>,
}

impl Console {
    fn emit(&self, event: ConsoleEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Append a timestamped client-side line to the sink and the display.
    fn push_log(&mut self, message: &str) {
        let line = timestamped(message);
        self.state.logs.push(line.clone());
        self.emit(ConsoleEvent::LogLine(line));
    }

    /// One poll tick: query the host and reconcile. A failed query is
    /// transient: it surfaces as a log line and changes nothing else, and the
    /// next tick stays scheduled.
    async fn poll_once(&mut self) {
        match self.host.get_progress().await {
            Ok(snapshot) => {
                let (next, effects) = reconcile(&self.state, &snapshot);
                self.state = next;
                for effect in effects {
                    self.apply(effect);
                }
            }
            Err(e) => {
                self.push_log(&format!("Progress check failed: {e:#}"));
            }
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::ShowStatus(status) => self.emit(ConsoleEvent::StatusChanged(status)),
            Effect::ReplaceLogs(lines) => self.emit(ConsoleEvent::LogsReplaced(lines)),
            Effect::SetResumeVisible(visible) => self.emit(ConsoleEvent::ResumeVisible(visible)),
            Effect::ShowOutputPath(path) => self.emit(ConsoleEvent::OutputSaved(path)),
            Effect::SetSubmitEnabled(enabled) => self.emit(ConsoleEvent::SubmitEnabled(enabled)),
            Effect::StopPolling => self.poller.stop(),
        }
    }

    /// Start-job dispatcher: optimistic `running` state, then the facade
    /// call. A rejected start is corrected to `error` immediately rather than
    /// waiting for a poll.
    async fn dispatch_start(&mut self, fields: FormFields) {
        self.emit(ConsoleEvent::SubmitEnabled(false));
        self.state.status = JobStatus::Running;
        self.emit(ConsoleEvent::StatusChanged(JobStatus::Running));
        self.state.output_path = None;
        self.emit(ConsoleEvent::OutputCleared);
        let line = timestamped("Starting job and contacting the host...");
        self.state.logs.reset(line.clone());
        self.emit(ConsoleEvent::LogsReplaced(vec![line]));

        match self.host.start_job(&fields).await {
            Ok(()) => {
                self.poller.start();
            }
            Err(e) => {
                self.push_log(&format!("Start failed: {e:#}"));
                self.emit(ConsoleEvent::SubmitEnabled(true));
                self.state.status = JobStatus::Error;
                self.emit(ConsoleEvent::StatusChanged(JobStatus::Error));
            }
        }
    }

    /// Resume dispatcher. The affordance is re-armed unconditionally; the
    /// actual status transition is only ever observed through the next poll,
    /// so the user may retry until a snapshot says otherwise.
    async fn dispatch_resume(&mut self) {
        self.emit(ConsoleEvent::ResumeEnabled(false));
        self.push_log("Continue clicked. Resuming after manual verification.");
        if let Err(e) = self.host.resume_after_pause().await {
            self.push_log(&format!("Resume failed: {e:#}"));
        }
        self.emit(ConsoleEvent::ResumeEnabled(true));
    }

    /// Poster login dispatcher: fire-and-forget, never touches job status or
    /// the poller.
    async fn dispatch_poster_login(&mut self, request: PosterRequest) {
        if request.email.trim().is_empty() || request.password.trim().is_empty() {
            self.emit(ConsoleEvent::PosterNotice(
                "Email and password are required.".into(),
            ));
            return;
        }
        self.emit(ConsoleEvent::PosterEnabled(false));
        self.push_log("Poster login: opening a session on the host...");
        match self.host.poster_login(&request).await {
            Ok(()) => self.emit(ConsoleEvent::PosterNotice("Poster login requested.".into())),
            Err(e) => {
                self.push_log(&format!("Poster login failed: {e:#}"));
                self.emit(ConsoleEvent::PosterNotice("Poster login failed.".into()));
            }
        }
        self.emit(ConsoleEvent::PosterEnabled(true));
    }

    /// Secondary post dispatcher: validates locally, then fire-and-forget.
    async fn dispatch_poster_post(&mut self, request: PosterRequest) {
        if request.title.trim().is_empty() {
            self.emit(ConsoleEvent::PosterNotice("Title is required.".into()));
            return;
        }
        self.emit(ConsoleEvent::PosterEnabled(false));
        self.push_log("Submitting post request to the host...");
        match self.host.poster_generate_and_post(&request).await {
            Ok(()) => self.emit(ConsoleEvent::PosterNotice("Post request sent.".into())),
            Err(e) => {
                self.push_log(&format!("Post failed: {e:#}"));
                self.emit(ConsoleEvent::PosterNotice(
                    "Post failed. See log for details.".into(),
                ));
            }
        }
        self.emit(ConsoleEvent::PosterEnabled(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProgressSnapshot;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MockHost {
        script: Mutex<VecDeque<Result<ProgressSnapshot, String>>>,
        calls: Mutex<Vec<&'static str>>,
        fail_start: bool,
        fail_resume: bool,
        fail_login: bool,
        fail_post: bool,
    }

    impl MockHost {
        fn scripted(script: Vec<Result<ProgressSnapshot, String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn count(&self, name: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
        }
    }

    #[async_trait]
    impl HostApi for MockHost {
        async fn start_job(&self, _fields: &FormFields) -> Result<()> {
            self.calls.lock().unwrap().push("start");
            if self.fail_start {
                anyhow::bail!("host refused start");
            }
            Ok(())
        }

        async fn get_progress(&self) -> Result<ProgressSnapshot> {
            self.calls.lock().unwrap().push("progress");
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(snapshot)) => Ok(snapshot),
                Some(Err(message)) => anyhow::bail!(message),
                None => anyhow::bail!("progress script exhausted"),
            }
        }

        async fn resume_after_pause(&self) -> Result<()> {
            self.calls.lock().unwrap().push("resume");
            if self.fail_resume {
                anyhow::bail!("resume rejected");
            }
            Ok(())
        }

        async fn poster_login(&self, _request: &PosterRequest) -> Result<()> {
            self.calls.lock().unwrap().push("login");
            if self.fail_login {
                anyhow::bail!("login rejected");
            }
            Ok(())
        }

        async fn poster_generate_and_post(&self, _request: &PosterRequest) -> Result<()> {
            self.calls.lock().unwrap().push("post");
            if self.fail_post {
                anyhow::bail!("post rejected");
            }
            Ok(())
        }
    }

    fn snap(status: JobStatus, logs: &[&str], output_path: Option<&str>) -> ProgressSnapshot {
        ProgressSnapshot {
            status,
            logs: logs.iter().map(|s| s.to_string()).collect(),
            output_path: output_path.map(|s| s.to_string()),
        }
    }

    type Spawned = (
        mpsc::UnboundedSender<UiCommand>,
        mpsc::UnboundedReceiver<ConsoleEvent>,
        tokio::task::JoinHandle<Result<()>>,
    );

    fn spawn_console(host: Arc<MockHost>) -> Spawned {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let dyn_host: Arc<dyn HostApi> = host;
        let handle = tokio::spawn(run_controller(
            dyn_host,
            ControllerOptions::default(),
            event_tx,
            cmd_rx,
        ));
        (cmd_tx, event_rx, handle)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConsoleEvent>) -> ConsoleEvent {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for a console event")
            .expect("event channel closed")
    }

    async fn drain_until(
        rx: &mut mpsc::UnboundedReceiver<ConsoleEvent>,
        pred: impl Fn(&ConsoleEvent) -> bool,
    ) -> Vec<ConsoleEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(rx).await;
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    fn statuses(events: &[ConsoleEvent]) -> Vec<JobStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                ConsoleEvent::StatusChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    async fn shut_down(cmd_tx: mpsc::UnboundedSender<UiCommand>, handle: tokio::task::JoinHandle<Result<()>>) {
        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_polls_until_terminal_and_stops() {
        let host = Arc::new(MockHost::scripted(vec![
            Ok(snap(JobStatus::Running, &["a"], None)),
            Ok(snap(JobStatus::Idle, &["a", "b", "done"], Some("/out/x.csv"))),
        ]));
        let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

        cmd_tx.send(UiCommand::StartScrape(FormFields::new())).unwrap();
        let events = drain_until(&mut event_rx, |e| {
            matches!(e, ConsoleEvent::SubmitEnabled(true))
        })
        .await;

        // Optimistic running, then one running snapshot, then terminal idle.
        assert_eq!(
            statuses(&events),
            [JobStatus::Running, JobStatus::Running, JobStatus::Idle]
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, ConsoleEvent::OutputSaved(p) if p == "/out/x.csv")));
        assert!(events
            .iter()
            .any(|e| matches!(e, ConsoleEvent::LogsReplaced(l) if l.last().is_some_and(|s| s == "done"))));

        // Terminal status cancelled the timer: no tick fires afterwards.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(host.count("progress"), 2);

        shut_down(cmd_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_start_reverts_optimistic_running_to_error() {
        let host = Arc::new(MockHost {
            fail_start: true,
            ..Default::default()
        });
        let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

        cmd_tx.send(UiCommand::StartScrape(FormFields::new())).unwrap();
        let events = drain_until(&mut event_rx, |e| {
            matches!(e, ConsoleEvent::StatusChanged(JobStatus::Error))
        })
        .await;

        assert!(matches!(events[0], ConsoleEvent::SubmitEnabled(false)));
        assert!(matches!(
            events[1],
            ConsoleEvent::StatusChanged(JobStatus::Running)
        ));
        assert!(matches!(events[2], ConsoleEvent::OutputCleared));
        assert!(matches!(&events[3], ConsoleEvent::LogsReplaced(l) if l.len() == 1));
        assert!(matches!(&events[4], ConsoleEvent::LogLine(l) if l.contains("Start failed")));
        assert!(matches!(events[5], ConsoleEvent::SubmitEnabled(true)));

        // The poller never started.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(host.count("progress"), 0);

        shut_down(cmd_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn verification_reveals_resume_and_resume_rearms() {
        let host = Arc::new(MockHost::scripted(vec![
            Ok(snap(JobStatus::Running, &["a"], None)),
            Ok(snap(JobStatus::Verification, &["a", "b"], None)),
            Ok(snap(JobStatus::Running, &["a", "b", "c"], None)),
            Ok(snap(JobStatus::Idle, &["a", "b", "c", "done"], Some("/out/x.csv"))),
        ]));
        let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

        cmd_tx.send(UiCommand::StartScrape(FormFields::new())).unwrap();
        drain_until(&mut event_rx, |e| matches!(e, ConsoleEvent::ResumeVisible(true))).await;

        cmd_tx.send(UiCommand::Resume).unwrap();
        let events = drain_until(&mut event_rx, |e| {
            matches!(e, ConsoleEvent::ResumeEnabled(true))
        })
        .await;

        // The dispatcher runs without yielding to a tick: disable, log, call,
        // re-enable arrive as one contiguous run.
        let disabled = events
            .iter()
            .position(|e| matches!(e, ConsoleEvent::ResumeEnabled(false)))
            .expect("resume affordance disabled during the call");
        assert!(matches!(&events[disabled + 1], ConsoleEvent::LogLine(l) if l.contains("Resuming")));
        assert!(matches!(events[disabled + 2], ConsoleEvent::ResumeEnabled(true)));
        assert_eq!(host.count("resume"), 1);

        let events = drain_until(&mut event_rx, |e| {
            matches!(e, ConsoleEvent::SubmitEnabled(true))
        })
        .await;
        // Resume's effect is only observed through snapshots: running again,
        // then terminal, with the affordance hidden on the way.
        assert!(events
            .iter()
            .any(|e| matches!(e, ConsoleEvent::ResumeVisible(false))));

        shut_down(cmd_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resume_still_rearms_affordance() {
        let host = Arc::new(MockHost {
            fail_resume: true,
            ..Default::default()
        });
        let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

        cmd_tx.send(UiCommand::Resume).unwrap();
        let events = drain_until(&mut event_rx, |e| {
            matches!(e, ConsoleEvent::ResumeEnabled(true))
        })
        .await;

        assert!(matches!(events[0], ConsoleEvent::ResumeEnabled(false)));
        assert!(matches!(&events[1], ConsoleEvent::LogLine(l) if l.contains("Resuming")));
        assert!(matches!(&events[2], ConsoleEvent::LogLine(l) if l.contains("Resume failed")));
        assert!(matches!(events[3], ConsoleEvent::ResumeEnabled(true)));

        shut_down(cmd_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_is_transient_and_keeps_ticking() {
        let host = Arc::new(MockHost::scripted(vec![
            Ok(snap(JobStatus::Running, &["a"], None)),
            Err("connection reset".into()),
            Ok(snap(JobStatus::Idle, &["a", "done"], None)),
        ]));
        let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

        cmd_tx.send(UiCommand::StartScrape(FormFields::new())).unwrap();
        let events = drain_until(&mut event_rx, |e| {
            matches!(e, ConsoleEvent::SubmitEnabled(true))
        })
        .await;

        // The failed tick appended a line and changed nothing else; the next
        // tick was still issued and reached the terminal snapshot.
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ConsoleEvent::LogLine(l) if l.contains("Progress check failed")))
                .count(),
            1
        );
        assert_eq!(
            statuses(&events),
            [JobStatus::Running, JobStatus::Running, JobStatus::Idle]
        );
        assert_eq!(host.count("progress"), 3);

        shut_down(cmd_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_title_is_rejected_locally() {
        let host = Arc::new(MockHost::default());
        let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

        cmd_tx
            .send(UiCommand::PosterPost(PosterRequest {
                title: "   ".into(),
                ..Default::default()
            }))
            .unwrap();

        let event = next_event(&mut event_rx).await;
        assert!(matches!(&event, ConsoleEvent::PosterNotice(m) if m.contains("required")));

        // No facade call, no disable/enable cycle.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(event_rx.try_recv().is_err());
        assert_eq!(host.count("post"), 0);

        shut_down(cmd_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn poster_post_rearms_trigger_on_success_and_failure() {
        for fail in [false, true] {
            let host = Arc::new(MockHost {
                fail_post: fail,
                ..Default::default()
            });
            let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

            cmd_tx
                .send(UiCommand::PosterPost(PosterRequest {
                    title: "Weekly roundup".into(),
                    ..Default::default()
                }))
                .unwrap();

            let events = drain_until(&mut event_rx, |e| {
                matches!(e, ConsoleEvent::PosterEnabled(true))
            })
            .await;
            assert!(matches!(events[0], ConsoleEvent::PosterEnabled(false)));
            let notice = events
                .iter()
                .find_map(|e| match e {
                    ConsoleEvent::PosterNotice(m) => Some(m.clone()),
                    _ => None,
                })
                .expect("a poster notice is always shown");
            if fail {
                assert!(notice.contains("failed"));
            } else {
                assert!(notice.contains("sent"));
            }
            assert_eq!(host.count("post"), 1);
            // The job state machine is untouched by the secondary flow.
            assert!(statuses(&events).is_empty());

            shut_down(cmd_tx, handle).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poster_login_requires_credentials() {
        let host = Arc::new(MockHost::default());
        let (cmd_tx, mut event_rx, handle) = spawn_console(host.clone());

        cmd_tx
            .send(UiCommand::PosterLogin(PosterRequest {
                email: "user@example.com".into(),
                password: String::new(),
                ..Default::default()
            }))
            .unwrap();

        let event = next_event(&mut event_rx).await;
        assert!(matches!(&event, ConsoleEvent::PosterNotice(m) if m.contains("required")));
        assert_eq!(host.count("login"), 0);

        shut_down(cmd_tx, handle).await;
    }
}
