use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Form field names mapped to their values, exactly as collected from the
/// view layer. The host owns the schema; the console passes fields through
/// verbatim.
pub type FormFields = BTreeMap<String, String>;

/// Job status reported by the host. Exactly one value is current at any
/// instant; each progress snapshot replaces it wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    /// Blocked on a manual verification step in the host browser.
    Verification,
    Error,
}

impl JobStatus {
    /// Terminal statuses end the polling cycle until a fresh start.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Idle | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Verification => "verification",
            JobStatus::Error => "error",
        }
    }
}

/// One poll result: the job's complete observable state at that instant.
/// `logs` is the full cumulative history, not a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

/// Payload for the poster flows. `title` is required by the generate-and-post
/// dispatcher; `email`/`password` by the login dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PosterRequest {
    pub email: String,
    pub password: String,
    pub title: String,
    #[serde(default)]
    pub counter: String,
    #[serde(default)]
    pub timer: String,
    #[serde(default)]
    pub schedule: String,
}

/// Ordered log lines shown to the user. Snapshots replace the whole buffer;
/// client-side lines (dispatch notices, poll failures) are appended between
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSink {
    lines: Vec<String>,
}

impl LogSink {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Drop everything and start over with a single line.
    pub fn reset(&mut self, line: String) {
        self.lines.clear();
        self.lines.push(line);
    }

    /// Full-replace semantics: display equals the latest snapshot's history.
    pub fn replace(&mut self, lines: Vec<String>) {
        self.lines = lines;
    }

    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}

/// The single authoritative state record. Mutated only by the reconciler and
/// the dispatchers' optimistic writes; the view layer holds a mirror fed by
/// `ConsoleEvent`s.
#[derive(Debug, Clone, Default)]
pub struct ConsoleState {
    pub status: JobStatus,
    pub logs: LogSink,
    /// Sticky: a snapshot without an output path never clears this.
    pub output_path: Option<String>,
}

impl ConsoleState {
    /// The resume affordance is a pure derivation of status, recomputed on
    /// every tick.
    pub fn resume_visible(&self) -> bool {
        self.status == JobStatus::Verification
    }
}

/// Display updates emitted by the controller and rendered by presentation
/// layers (TUI or headless stderr writer).
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    StatusChanged(JobStatus),
    /// The Log Sink was replaced wholesale (snapshot applied or start reset).
    LogsReplaced(Vec<String>),
    /// A single client-side line was appended.
    LogLine(String),
    ResumeVisible(bool),
    ResumeEnabled(bool),
    OutputSaved(String),
    OutputCleared,
    SubmitEnabled(bool),
    PosterEnabled(bool),
    PosterNotice(String),
}

/// Prefix a client-side log line with a wall-clock timestamp, matching the
/// host's own log format.
pub fn timestamped(message: &str) -> String {
    let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    match now.format(fmt) {
        Ok(ts) => format!("[{ts}] {message}"),
        Err(_) => message.to_string(),
    }
}
