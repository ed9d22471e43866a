use crate::model::{ConsoleState, JobStatus, ProgressSnapshot};

/// Side effects decided by the reconciler and executed at the controller
/// boundary. Display effects are forwarded to the view layer verbatim;
/// `StopPolling` is handled by the controller itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    ShowStatus(JobStatus),
    ReplaceLogs(Vec<String>),
    SetResumeVisible(bool),
    ShowOutputPath(String),
    SetSubmitEnabled(bool),
    StopPolling,
}

/// Interpret one snapshot against the previous state. Pure: all mutation and
/// I/O happen in the caller, driven by the returned effects.
///
/// Rules, in order: status replaced wholesale; logs fully replaced; resume
/// visibility derived from status; output path sticky across absent ticks;
/// terminal statuses release the submit control and end polling.
pub(crate) fn reconcile(
    prev: &ConsoleState,
    snapshot: &ProgressSnapshot,
) -> (ConsoleState, Vec<Effect>) {
    let mut next = prev.clone();
    let mut effects = Vec::new();

    next.status = snapshot.status;
    effects.push(Effect::ShowStatus(next.status));

    next.logs.replace(snapshot.logs.clone());
    effects.push(Effect::ReplaceLogs(snapshot.logs.clone()));

    effects.push(Effect::SetResumeVisible(next.resume_visible()));

    if let Some(path) = &snapshot.output_path {
        next.output_path = Some(path.clone());
        effects.push(Effect::ShowOutputPath(path.clone()));
    }

    effects.push(Effect::SetSubmitEnabled(next.status.is_terminal()));
    if next.status.is_terminal() {
        effects.push(Effect::StopPolling);
    }

    (next, effects)
}
